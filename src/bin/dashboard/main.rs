mod app;

use std::io;
use std::time::{Duration, Instant};

use crossterm::{
    event::{self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEventKind},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    symbols,
    text::{Line, Span},
    widgets::{Axis, Block, Borders, Cell, Chart, Dataset, GraphType, Paragraph, Row, Table, TableState, Wrap},
    Frame, Terminal,
};
use tokio::sync::mpsc::{self, UnboundedReceiver};

use app::{format_currency, format_number, format_percent, truncate, AppState, Fetched, InputMode, View};
use coin_dashboard::client::DataClient;
use coin_dashboard::config::{DashboardConfig, DASHBOARD_REFRESH_SECS};
use coin_dashboard::types::ChartPeriod;
use coin_dashboard::watchlist::{FileStore, Watchlist};

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> io::Result<()> {
    let cfg = DashboardConfig::from_env();

    let client = match DataClient::new(&cfg.api_url) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Config error: {e}");
            std::process::exit(1);
        }
    };

    let watchlist = Watchlist::load(FileStore::new(&cfg.watchlist_path));
    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut app = AppState::new(client, watchlist, tx);

    // First requests go out before the terminal is taken over.
    app.sync();

    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let mut table_state = TableState::default();
    table_state.select(Some(0));

    let result = run_loop(&mut terminal, &mut app, &mut rx, &mut table_state);

    // Restore terminal regardless of result
    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor()?;

    result
}

// ---------------------------------------------------------------------------
// Main event loop
// ---------------------------------------------------------------------------

fn run_loop(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    app: &mut AppState,
    rx: &mut UnboundedReceiver<Fetched>,
    table_state: &mut TableState,
) -> io::Result<()> {
    let refresh_interval = Duration::from_secs(DASHBOARD_REFRESH_SECS);
    let frame_interval = Duration::from_millis(100);

    loop {
        while let Ok(fetched) = rx.try_recv() {
            app.apply(fetched);
        }
        if app.settle_search(Instant::now()) {
            table_state.select(Some(0));
        }

        terminal.draw(|f| render(f, app, table_state))?;

        if event::poll(frame_interval)? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press && handle_key(key.code, app, table_state) {
                    return Ok(());
                }
            }
        }

        if app.last_refresh.elapsed() >= refresh_interval {
            app.tick_refresh();
        }
    }
}

/// Returns true when the user asked to quit.
fn handle_key(code: KeyCode, app: &mut AppState, table_state: &mut TableState) -> bool {
    let now = Instant::now();

    if app.input == InputMode::Search {
        match code {
            KeyCode::Enter => app.input = InputMode::Normal,
            KeyCode::Esc => {
                app.clear_search(now);
                app.input = InputMode::Normal;
            }
            KeyCode::Backspace => app.pop_search_char(now),
            KeyCode::Char(c) => app.push_search_char(c, now),
            _ => {}
        }
        return false;
    }

    app.notice = None;

    match code {
        KeyCode::Char('q') | KeyCode::Char('Q') => return true,
        KeyCode::Char('r') | KeyCode::Char('R') => app.refresh(),
        KeyCode::Esc if app.detail_id().is_some() => app.close_detail(),
        KeyCode::Char('s') => {
            let id = app
                .detail_id()
                .map(str::to_string)
                .or_else(|| selected_id(app, table_state));
            if let Some(id) = id {
                app.toggle_watch(&id);
            }
        }
        _ if app.detail_id().is_some() => {
            let period = match code {
                KeyCode::Char('1') => Some(ChartPeriod::Day),
                KeyCode::Char('7') => Some(ChartPeriod::Week),
                KeyCode::Char('3') => Some(ChartPeriod::Month),
                KeyCode::Char('9') => Some(ChartPeriod::Quarter),
                KeyCode::Tab => {
                    let idx = ChartPeriod::ALL.iter().position(|p| *p == app.period).unwrap_or(0);
                    Some(ChartPeriod::ALL[(idx + 1) % ChartPeriod::ALL.len()])
                }
                _ => None,
            };
            if let Some(p) = period {
                app.set_period(p);
            }
        }
        KeyCode::Char('/') => {
            app.input = InputMode::Search;
        }
        KeyCode::Char('m') => {
            app.filter.market_cap = app.filter.market_cap.next();
            table_state.select(Some(0));
        }
        KeyCode::Char('c') => {
            app.filter.change = app.filter.change.next();
            table_state.select(Some(0));
        }
        KeyCode::Char('p') if app.view == View::Markets => {
            app.cycle_per_page();
            table_state.select(Some(0));
        }
        KeyCode::Right | KeyCode::Char('l') if app.view == View::Markets => {
            if app.next_page() {
                table_state.select(Some(0));
            }
        }
        KeyCode::Left | KeyCode::Char('h') if app.view == View::Markets => {
            if app.prev_page() {
                table_state.select(Some(0));
            }
        }
        KeyCode::Char('w') => {
            if app.view == View::Watchlist {
                app.show_markets();
            } else {
                app.show_watchlist();
            }
            table_state.select(Some(0));
        }
        KeyCode::Down | KeyCode::Char('j') => {
            let max = app.visible_coins().len().saturating_sub(1);
            let next = table_state.selected().map_or(0, |i| (i + 1).min(max));
            table_state.select(Some(next));
        }
        KeyCode::Up | KeyCode::Char('k') => {
            let prev = table_state.selected().map_or(0, |i| i.saturating_sub(1));
            table_state.select(Some(prev));
        }
        KeyCode::Enter => {
            if let Some(id) = selected_id(app, table_state) {
                app.open_detail(&id);
            }
        }
        _ => {}
    }
    false
}

fn selected_id(app: &AppState, table_state: &TableState) -> Option<String> {
    let idx = table_state.selected()?;
    app.visible_coins().get(idx).map(|c| c.id.clone())
}

// ---------------------------------------------------------------------------
// Rendering
// ---------------------------------------------------------------------------

fn render(f: &mut Frame, app: &AppState, table_state: &mut TableState) {
    let area = f.area();

    // Outer vertical split: header | body | footer
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // global stats
            Constraint::Min(0),    // body
            Constraint::Length(1), // footer
        ])
        .split(area);

    render_header(f, app, chunks[0]);
    match &app.view {
        View::Detail { id } => render_detail(f, app, id, chunks[1]),
        _ => render_list(f, app, table_state, chunks[1]),
    }
    render_footer(f, app, chunks[2]);
}

fn render_header(f: &mut Frame, app: &AppState, area: Rect) {
    let label = Style::default().fg(Color::DarkGray);
    let value = Style::default().fg(Color::White);

    let mut spans = vec![Span::styled(
        " Crypto Markets  ",
        Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
    )];

    match (app.global.value(), app.global.error()) {
        (Some(g), _) => {
            let d = &g.data;
            let cap = d.total_market_cap_in("usd").map_or("—".to_string(), format_currency);
            let vol = d.total_volume_in("usd").map_or("—".to_string(), format_currency);
            let dom = d.btc_dominance().map_or("—".to_string(), |v| format!("{v:.1}%"));
            let change = d.market_cap_change_percentage_24h_usd;

            spans.extend([
                Span::styled("Market Cap ", label),
                Span::styled(cap, value),
                Span::raw(" "),
                Span::styled(format_percent(change), Style::default().fg(change_color(change))),
                Span::raw("  │  "),
                Span::styled("24h Volume ", label),
                Span::styled(vol, value),
                Span::raw("  │  "),
                Span::styled("BTC Dominance ", label),
                Span::styled(dom, value),
                Span::raw("  │  "),
                Span::styled("Active ", label),
                Span::styled(format_number(d.active_cryptocurrencies as f64), value),
            ]);
        }
        (None, Some(e)) => spans.push(Span::styled(format!("✗ {}", truncate(e, 60)), Style::default().fg(Color::Red))),
        (None, None) => spans.push(Span::styled("◌ loading", Style::default().fg(Color::Yellow))),
    }

    let paragraph = Paragraph::new(Line::from(spans))
        .block(Block::default().borders(Borders::ALL).border_style(Style::default().fg(Color::DarkGray)));
    f.render_widget(paragraph, area);
}

fn render_list(f: &mut Frame, app: &AppState, state: &mut TableState, area: Rect) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(1), Constraint::Min(0)])
        .split(area);

    render_filter_bar(f, app, chunks[0]);
    render_coin_table(f, app, state, chunks[1]);
}

fn render_filter_bar(f: &mut Frame, app: &AppState, area: Rect) {
    let key = Style::default().fg(Color::Yellow);
    let search_style = if app.input == InputMode::Search {
        Style::default().fg(Color::White).add_modifier(Modifier::UNDERLINED)
    } else {
        Style::default().fg(Color::White)
    };
    let search = if app.search_input.is_empty() && app.input != InputMode::Search {
        "—".to_string()
    } else {
        app.search_input.clone()
    };

    let mut spans = vec![
        Span::styled(" [/] ", key),
        Span::raw("search: "),
        Span::styled(search, search_style),
    ];
    if app.debouncer.is_pending() {
        spans.push(Span::styled(" …", Style::default().fg(Color::DarkGray)));
    }
    if app.list_view == View::Markets {
        spans.extend([
            Span::styled("   [m] ", key),
            Span::raw(app.filter.market_cap.to_string()),
            Span::styled("   [c] ", key),
            Span::raw(app.filter.change.to_string()),
            Span::styled("   [p] ", key),
            Span::raw(format!("{} per page", app.pagination.per_page)),
        ]);
    }
    f.render_widget(Paragraph::new(Line::from(spans)), area);
}

fn render_coin_table(f: &mut Frame, app: &AppState, state: &mut TableState, area: Rect) {
    let header_cells = ["", "#", "Coin", "Price", "24h %", "Market Cap", "Volume (24h)"]
        .iter()
        .map(|h| Cell::from(*h).style(Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD)));
    let header = Row::new(header_cells).height(1);

    let coins = app.visible_coins();
    if let Some(i) = state.selected() {
        if i >= coins.len() {
            state.select(Some(coins.len().saturating_sub(1)));
        }
    }

    let rows: Vec<Row> = coins
        .iter()
        .map(|c| {
            let starred = app.watchlist.contains(&c.id);
            let star = if starred { "★" } else { "☆" };
            let change = c.price_change_percentage_24h;

            Row::new(vec![
                Cell::from(star).style(Style::default().fg(if starred { Color::Yellow } else { Color::DarkGray })),
                Cell::from(c.market_cap_rank.to_string()).style(Style::default().fg(Color::DarkGray)),
                Cell::from(format!("{} {}", truncate(&c.name, 18), c.symbol.to_uppercase())),
                Cell::from(format_currency(c.current_price)),
                Cell::from(format_percent(change)).style(Style::default().fg(change_color(change))),
                Cell::from(format_currency(c.market_cap)),
                Cell::from(format_currency(c.total_volume)).style(Style::default().fg(Color::Cyan)),
            ])
        })
        .collect();

    let (slot_loading, slot_error) = match app.list_view {
        View::Watchlist => (app.watch_coins.is_loading(), app.watch_coins.error()),
        _ => (app.coins.is_loading(), app.coins.error()),
    };

    let mut title = match app.list_view {
        View::Watchlist => format!(" WATCHLIST ({}) ", app.watchlist.len()),
        _ => {
            let total = app
                .known_total()
                .map(|t| format!(" of {}", app.pagination.total_pages(t)))
                .unwrap_or_default();
            format!(" MARKETS · page {}{} ", app.pagination.page, total)
        }
    };
    if slot_loading {
        title.push_str("◌ ");
    }

    let mut block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::DarkGray))
        .title(Span::styled(title, Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD)));
    if let Some(e) = slot_error {
        block = block.title_bottom(Span::styled(format!(" ✗ {} ", truncate(e, 80)), Style::default().fg(Color::Red)));
    }

    if rows.is_empty() && !slot_loading {
        let msg = match app.list_view {
            View::Watchlist if app.watchlist.is_empty() => "Your watchlist is empty. Press [s] on a coin to star it.",
            _ if app.filter.is_active() => "No coins match the current filters.",
            _ => "No data.",
        };
        f.render_widget(
            Paragraph::new(Span::styled(msg, Style::default().fg(Color::DarkGray))).block(block),
            area,
        );
        return;
    }

    let table = Table::new(
        rows,
        [
            Constraint::Length(2),
            Constraint::Length(5),
            Constraint::Min(16),
            Constraint::Length(14),
            Constraint::Length(9),
            Constraint::Length(12),
            Constraint::Length(12),
        ],
    )
    .header(header)
    .block(block)
    .row_highlight_style(Style::default().bg(Color::DarkGray).add_modifier(Modifier::BOLD));

    f.render_stateful_widget(table, area, state);
}

fn render_detail(f: &mut Frame, app: &AppState, id: &str, area: Rect) {
    let halves = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(35), Constraint::Percentage(65)])
        .split(area);

    render_detail_stats(f, app, id, halves[0]);
    render_chart(f, app, halves[1]);
}

fn render_detail_stats(f: &mut Frame, app: &AppState, id: &str, area: Rect) {
    let label = Style::default().fg(Color::DarkGray);
    let starred = app.watchlist.contains(id);

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::DarkGray))
        .title(Span::styled(
            format!(" {} {} ", if starred { "★" } else { "☆" }, id),
            Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
        ));

    let Some(coin) = app.detail.value().filter(|c| c.id == id) else {
        let msg = match app.detail.error() {
            Some(e) => Span::styled(format!("✗ {e}"), Style::default().fg(Color::Red)),
            None => Span::styled("◌ loading", Style::default().fg(Color::Yellow)),
        };
        f.render_widget(Paragraph::new(msg).block(block), area);
        return;
    };

    let md = &coin.market_data;
    let usd = |v: Option<f64>| v.map_or("—".to_string(), format_currency);
    let pct = |v: f64| Span::styled(format_percent(v), Style::default().fg(change_color(v)));
    let supply = |v: Option<f64>| v.map_or("∞".to_string(), format_number);

    let mut lines = vec![
        Line::from(vec![
            Span::styled(coin.name.clone(), Style::default().add_modifier(Modifier::BOLD)),
            Span::styled(format!(" {}  #{}", coin.symbol.to_uppercase(), coin.market_cap_rank), label),
        ]),
        Line::from(vec![
            Span::styled(usd(md.price_in("usd")), Style::default().fg(Color::White).add_modifier(Modifier::BOLD)),
            Span::raw(" "),
            pct(md.price_change_percentage_24h),
        ]),
        Line::raw(""),
        Line::from(vec![Span::styled("Market Cap     ", label), Span::raw(usd(md.market_cap_in("usd")))]),
        Line::from(vec![Span::styled("24h Volume     ", label), Span::raw(usd(md.volume_in("usd")))]),
        Line::from(vec![Span::styled("7d / 30d       ", label), pct(md.price_change_percentage_7d), Span::raw(" / "), pct(md.price_change_percentage_30d)]),
        Line::from(vec![
            Span::styled("Circulating    ", label),
            Span::raw(format!("{} {}", format_number(md.circulating_supply), coin.symbol.to_uppercase())),
        ]),
        Line::from(vec![Span::styled("Total Supply   ", label), Span::raw(supply(md.total_supply))]),
        Line::from(vec![Span::styled("Max Supply     ", label), Span::raw(supply(md.max_supply))]),
        Line::from(vec![Span::styled("All-Time High  ", label), Span::raw(usd(md.ath_in("usd")))]),
        Line::from(vec![Span::styled("All-Time Low   ", label), Span::raw(usd(md.atl_in("usd")))]),
    ];

    let about = coin.description_en().trim();
    if !about.is_empty() {
        lines.push(Line::raw(""));
        lines.push(Line::styled(truncate(about, 600), label));
    }
    if let Some(e) = app.detail.error() {
        lines.push(Line::styled(format!("✗ {e}"), Style::default().fg(Color::Red)));
    }

    f.render_widget(Paragraph::new(lines).wrap(Wrap { trim: true }).block(block), area);
}

fn render_chart(f: &mut Frame, app: &AppState, area: Rect) {
    let periods: Vec<Span> = ChartPeriod::ALL
        .iter()
        .map(|p| {
            if *p == app.period {
                Span::styled(format!(" {p} "), Style::default().fg(Color::Black).bg(Color::Cyan))
            } else {
                Span::styled(format!(" {p} "), Style::default().fg(Color::DarkGray))
            }
        })
        .collect();

    let mut block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::DarkGray))
        .title(Line::from(periods));
    if let Some(e) = app.chart.error() {
        block = block.title_bottom(Span::styled(format!(" ✗ {} ", truncate(e, 80)), Style::default().fg(Color::Red)));
    }

    let series = match app.chart.value() {
        Some(s) if !s.prices.is_empty() => s,
        _ => {
            let msg = if app.chart.is_loading() { "◌ loading chart" } else { "No chart data." };
            f.render_widget(Paragraph::new(Span::styled(msg, Style::default().fg(Color::DarkGray))).block(block), area);
            return;
        }
    };

    let points = series.price_points();
    let (t0, t1) = series.time_bounds().unwrap_or((0.0, 1.0));
    let (lo, hi) = series.price_bounds().unwrap_or((0.0, 1.0));
    let pad = ((hi - lo) * 0.05).max(hi.abs() * 1e-6);
    let up = series.price_change().unwrap_or(0.0) >= 0.0;

    let dataset = Dataset::default()
        .marker(symbols::Marker::Braille)
        .graph_type(GraphType::Line)
        .style(Style::default().fg(if up { Color::Green } else { Color::Red }))
        .data(&points);

    let chart = Chart::new(vec![dataset])
        .block(block)
        .x_axis(
            Axis::default()
                .style(Style::default().fg(Color::DarkGray))
                .bounds([t0, t1.max(t0 + 1.0)])
                .labels([format!("-{}", app.period), "now".to_string()]),
        )
        .y_axis(
            Axis::default()
                .style(Style::default().fg(Color::DarkGray))
                .bounds([lo - pad, hi + pad])
                .labels([format_currency(lo), format_currency(hi)]),
        );

    f.render_widget(chart, area);
}

fn render_footer(f: &mut Frame, app: &AppState, area: Rect) {
    let key = Style::default().fg(Color::Yellow);

    if let Some(notice) = &app.notice {
        let line = Line::from(Span::styled(format!(" {notice}"), Style::default().fg(Color::Cyan)));
        f.render_widget(Paragraph::new(line), area);
        return;
    }

    let hints: &[(&str, &str)] = match (&app.view, app.input) {
        (_, InputMode::Search) => &[("[Enter] ", "done  "), ("[Esc] ", "clear  ")],
        (View::Detail { .. }, _) => &[
            ("[q] ", "quit  "),
            ("[Esc] ", "back  "),
            ("[1 7 3 9 / Tab] ", "period  "),
            ("[s] ", "star  "),
            ("[r] ", "refresh  "),
        ],
        (View::Watchlist, _) => &[
            ("[q] ", "quit  "),
            ("[↑↓ / j k] ", "select  "),
            ("[Enter] ", "details  "),
            ("[s] ", "unstar  "),
            ("[w] ", "markets  "),
            ("[r] ", "refresh  "),
        ],
        (View::Markets, _) => &[
            ("[q] ", "quit  "),
            ("[↑↓ / j k] ", "select  "),
            ("[←→] ", "page  "),
            ("[Enter] ", "details  "),
            ("[s] ", "star  "),
            ("[w] ", "watchlist  "),
            ("[r] ", "refresh  "),
        ],
    };

    let mut spans = vec![Span::raw(" ")];
    for (k, label) in hints {
        spans.push(Span::styled(*k, key));
        spans.push(Span::raw(*label));
    }
    if app.view == View::Markets && app.input == InputMode::Normal && !app.has_next_page() {
        spans.push(Span::styled("last page  ", Style::default().fg(Color::DarkGray)));
    }
    spans.push(Span::styled(
        format!("auto-refresh: {DASHBOARD_REFRESH_SECS}s"),
        Style::default().fg(Color::DarkGray),
    ));

    f.render_widget(Paragraph::new(Line::from(spans)).style(Style::default().fg(Color::White)), area);
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn change_color(v: f64) -> Color {
    if v > 0.0 {
        Color::Green
    } else if v < 0.0 {
        Color::Red
    } else {
        Color::White
    }
}
