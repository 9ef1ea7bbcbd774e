use std::sync::Arc;
use std::time::Instant;

use serde::Deserialize;
use serde_json::Value;
use tokio::sync::mpsc::UnboundedSender;
use tracing::warn;

use coin_dashboard::client::{DataClient, LatestSlot};
use coin_dashboard::config::WATCHLIST_PAGE_SIZE;
use coin_dashboard::filter::{watchlist_view, CoinFilter, Debouncer, Pagination};
use coin_dashboard::resource::{CacheKey, CoinListParams, Resource};
use coin_dashboard::types::{ChartPeriod, ChartSeries, CoinDetail, CoinMarket, GlobalSnapshot};
use coin_dashboard::watchlist::{FileStore, KeyValueStore, Watchlist};

// ---------------------------------------------------------------------------
// Fetch plumbing
// ---------------------------------------------------------------------------

/// A finished background fetch, tagged with the key it was issued for.
#[derive(Debug)]
pub struct Fetched {
    pub key: CacheKey,
    pub result: Result<Arc<Value>, String>,
}

fn spawn_fetch(client: &DataClient, tx: &UnboundedSender<Fetched>, resource: Resource) {
    let client = client.clone();
    let tx = tx.clone();
    tokio::spawn(async move {
        let key = resource.cache_key();
        let result = client.fetch(&resource).await.map_err(|e| e.to_string());
        // Receiver gone means the UI has exited.
        let _ = tx.send(Fetched { key, result });
    });
}

/// Point `slot` at `resource`, fetching only when the wanted key changed.
fn ensure<T>(slot: &mut LatestSlot<T>, resource: Resource, client: &DataClient, tx: &UnboundedSender<Fetched>) {
    if slot.request(resource.cache_key()) {
        spawn_fetch(client, tx, resource);
    }
}

fn decode<T: for<'de> Deserialize<'de>>(result: Result<Arc<Value>, String>) -> Result<T, String> {
    let value = result?;
    T::deserialize(value.as_ref()).map_err(|e| format!("unexpected response shape: {e}"))
}

// ---------------------------------------------------------------------------
// App state
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum View {
    Markets,
    Watchlist,
    Detail { id: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputMode {
    Normal,
    Search,
}

pub struct AppState<S: KeyValueStore = FileStore> {
    client: DataClient,
    tx: UnboundedSender<Fetched>,
    pub view: View,
    /// View to return to from Detail.
    pub list_view: View,
    pub input: InputMode,
    /// Text as typed; `filter.search` only changes once it settles.
    pub search_input: String,
    pub debouncer: Debouncer,
    pub filter: CoinFilter,
    pub pagination: Pagination,
    pub period: ChartPeriod,
    pub global: LatestSlot<GlobalSnapshot>,
    pub coins: LatestSlot<Vec<CoinMarket>>,
    pub watch_coins: LatestSlot<Vec<CoinMarket>>,
    pub detail: LatestSlot<CoinDetail>,
    pub chart: LatestSlot<ChartSeries>,
    pub watchlist: Watchlist<S>,
    pub notice: Option<String>,
    pub last_refresh: Instant,
}

impl<S: KeyValueStore> AppState<S> {
    pub fn new(client: DataClient, watchlist: Watchlist<S>, tx: UnboundedSender<Fetched>) -> Self {
        Self {
            client,
            tx,
            view: View::Markets,
            list_view: View::Markets,
            input: InputMode::Normal,
            search_input: String::new(),
            debouncer: Debouncer::default(),
            filter: CoinFilter::default(),
            pagination: Pagination::default(),
            period: ChartPeriod::default(),
            global: LatestSlot::new(),
            coins: LatestSlot::new(),
            watch_coins: LatestSlot::new(),
            detail: LatestSlot::new(),
            chart: LatestSlot::new(),
            watchlist,
            notice: None,
            last_refresh: Instant::now(),
        }
    }

    /// Request whatever the current view needs. Cheap when nothing changed.
    pub fn sync(&mut self) {
        ensure(&mut self.global, Resource::Global, &self.client, &self.tx);

        match &self.view {
            View::Markets => {
                let params = CoinListParams::page(self.pagination.per_page, self.pagination.page);
                ensure(&mut self.coins, Resource::CoinList(params), &self.client, &self.tx);
            }
            View::Watchlist => {
                let params = CoinListParams::page(WATCHLIST_PAGE_SIZE, 1);
                ensure(&mut self.watch_coins, Resource::CoinList(params), &self.client, &self.tx);
            }
            View::Detail { id } => match (
                Resource::coin_detail(id),
                Resource::coin_chart(id, self.period),
            ) {
                (Ok(detail), Ok(chart)) => {
                    ensure(&mut self.detail, detail, &self.client, &self.tx);
                    ensure(&mut self.chart, chart, &self.client, &self.tx);
                }
                (Err(e), _) | (_, Err(e)) => self.notice = Some(e.to_string()),
            },
        }
    }

    /// Route a finished fetch to the slot for its resource. Stale keys are dropped
    /// by the slot itself.
    pub fn apply(&mut self, fetched: Fetched) {
        let Fetched { key, result } = fetched;
        match key.resource() {
            "global" => {
                self.global.resolve(&key, decode(result));
            }
            "coins/markets" => {
                let rows: Result<Vec<CoinMarket>, String> = decode(result);
                self.coins.resolve(&key, rows.clone());
                self.watch_coins.resolve(&key, rows);
            }
            "coins/detail" => {
                self.detail.resolve(&key, decode(result));
            }
            "coins/market_chart" => {
                let series: Result<ChartSeries, String> = decode(result);
                if let Ok(s) = &series {
                    if !s.is_ordered() {
                        warn!(key = %key, "chart timestamps out of order");
                    }
                }
                self.chart.resolve(&key, series);
            }
            other => warn!(resource = other, "result for unknown resource"),
        }
    }

    /// Drop every cached response and refetch the current view.
    pub fn refresh(&mut self) {
        self.client.invalidate_all();
        self.tick_refresh();
    }

    /// Periodic refetch. Entries still inside their stale window are served from
    /// the cache without a network call.
    pub fn tick_refresh(&mut self) {
        self.global.reset();
        self.coins.reset();
        self.watch_coins.reset();
        self.detail.reset();
        self.chart.reset();
        self.last_refresh = Instant::now();
        self.sync();
    }

    /// Apply a settled search term. Returns true if the filter changed.
    pub fn settle_search(&mut self, now: Instant) -> bool {
        match self.debouncer.settle(now) {
            Some(term) if term != self.filter.search => {
                self.filter.search = term;
                true
            }
            _ => false,
        }
    }

    pub fn push_search_char(&mut self, c: char, now: Instant) {
        self.search_input.push(c);
        self.debouncer.input(self.search_input.clone(), now);
    }

    pub fn pop_search_char(&mut self, now: Instant) {
        self.search_input.pop();
        self.debouncer.input(self.search_input.clone(), now);
    }

    pub fn clear_search(&mut self, now: Instant) {
        self.search_input.clear();
        self.debouncer.input(String::new(), now);
    }

    /// Rows shown in the current list view, after local filtering.
    pub fn visible_coins(&self) -> Vec<&CoinMarket> {
        match self.list_view {
            View::Watchlist => match self.watch_coins.value() {
                Some(coins) => watchlist_view(coins, |id| self.watchlist.contains(id), &self.filter.search),
                None => Vec::new(),
            },
            _ => match self.coins.value() {
                Some(coins) => self.filter.apply(coins),
                None => Vec::new(),
            },
        }
    }

    pub fn known_total(&self) -> Option<u64> {
        self.global.value().map(|g| g.data.active_cryptocurrencies)
    }

    fn last_page_len(&self) -> usize {
        self.coins.current_value().map_or(0, Vec::len)
    }

    pub fn has_next_page(&self) -> bool {
        self.pagination.has_next(self.known_total(), self.last_page_len())
    }

    pub fn next_page(&mut self) -> bool {
        let (total, len) = (self.known_total(), self.last_page_len());
        let moved = self.pagination.next(total, len);
        if moved {
            self.sync();
        }
        moved
    }

    pub fn prev_page(&mut self) -> bool {
        let moved = self.pagination.prev();
        if moved {
            self.sync();
        }
        moved
    }

    pub fn cycle_per_page(&mut self) {
        self.pagination.cycle_per_page();
        self.sync();
    }

    pub fn show_markets(&mut self) {
        self.view = View::Markets;
        self.list_view = View::Markets;
        self.sync();
    }

    pub fn show_watchlist(&mut self) {
        self.view = View::Watchlist;
        self.list_view = View::Watchlist;
        self.sync();
    }

    pub fn open_detail(&mut self, id: &str) {
        self.view = View::Detail { id: id.to_string() };
        self.sync();
    }

    pub fn close_detail(&mut self) {
        self.view = self.list_view.clone();
        self.sync();
    }

    pub fn set_period(&mut self, period: ChartPeriod) {
        if self.period != period {
            self.period = period;
            self.sync();
        }
    }

    /// Star or unstar a coin. Write failures keep the in-memory change and show
    /// a notice.
    pub fn toggle_watch(&mut self, id: &str) {
        match self.watchlist.toggle(id) {
            Ok(true) => self.notice = Some(format!("★ {id} added to watchlist")),
            Ok(false) => self.notice = Some(format!("{id} removed from watchlist")),
            Err(e) => {
                warn!(error = %e, "watchlist write failed");
                self.notice = Some(format!("could not save watchlist: {e}"));
            }
        }
    }

    pub fn detail_id(&self) -> Option<&str> {
        match &self.view {
            View::Detail { id } => Some(id),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Formatting helpers
// ---------------------------------------------------------------------------

/// USD with a magnitude suffix for large values and extra precision for
/// sub-dollar prices.
pub fn format_currency(v: f64) -> String {
    if !v.is_finite() {
        return "—".to_string();
    }
    let sign = if v < 0.0 { "-" } else { "" };
    let a = v.abs();
    if a >= 1e12 {
        format!("{sign}${:.2}T", a / 1e12)
    } else if a >= 1e9 {
        format!("{sign}${:.2}B", a / 1e9)
    } else if a >= 1e6 {
        format!("{sign}${:.2}M", a / 1e6)
    } else if a >= 1.0 {
        format!("{sign}${}", group_thousands(a, 2))
    } else if a == 0.0 {
        "$0.00".to_string()
    } else {
        format!("{sign}${:.6}", a)
    }
}

pub fn format_percent(v: f64) -> String {
    if v > 0.0 {
        format!("+{:.2}%", v)
    } else {
        format!("{:.2}%", v)
    }
}

/// Plain count with thousands separators and no decimals.
pub fn format_number(v: f64) -> String {
    if !v.is_finite() {
        return "—".to_string();
    }
    let s = group_thousands(v.abs(), 0);
    if v < 0.0 { format!("-{s}") } else { s }
}

fn group_thousands(v: f64, decimals: usize) -> String {
    let text = format!("{v:.decimals$}");
    let (int, frac) = match text.split_once('.') {
        Some((i, f)) => (i, Some(f)),
        None => (text.as_str(), None),
    };
    let mut grouped = String::with_capacity(int.len() + int.len() / 3);
    for (i, ch) in int.chars().enumerate() {
        if i > 0 && (int.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    match frac {
        Some(f) => format!("{grouped}.{f}"),
        None => grouped,
    }
}

pub fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let head: String = s.chars().take(max.saturating_sub(1)).collect();
        format!("{head}…")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use coin_dashboard::watchlist::MemoryStore;
    use serde_json::json;
    use tokio::sync::mpsc;

    fn app() -> (AppState<MemoryStore>, mpsc::UnboundedReceiver<Fetched>) {
        let (tx, rx) = mpsc::unbounded_channel();
        // Nothing listens on the discard port; spawned fetches just fail.
        let client = DataClient::new("http://127.0.0.1:9").unwrap();
        (AppState::new(client, Watchlist::load(MemoryStore::new()), tx), rx)
    }

    fn chart_result(id: &str, price: f64) -> Fetched {
        Fetched {
            key: Resource::coin_chart(id, ChartPeriod::Day).unwrap().cache_key(),
            result: Ok(Arc::new(json!({
                "prices": [[1.0, price], [2.0, price]],
                "market_caps": [],
                "total_volumes": []
            }))),
        }
    }

    #[test]
    fn currency_formatting() {
        assert_eq!(format_currency(2.5e12), "$2.50T");
        assert_eq!(format_currency(360_000_000_000.0), "$360.00B");
        assert_eq!(format_currency(12_345_678.0), "$12.35M");
        assert_eq!(format_currency(67_123.456), "$67,123.46");
        assert_eq!(format_currency(0.000123), "$0.000123");
        assert_eq!(format_currency(0.0), "$0.00");
    }

    #[test]
    fn percent_and_number_formatting() {
        assert_eq!(format_percent(2.5), "+2.50%");
        assert_eq!(format_percent(-1.0), "-1.00%");
        assert_eq!(format_percent(0.0), "0.00%");
        assert_eq!(format_number(19_600_000.0), "19,600,000");
        assert_eq!(format_number(999.0), "999");
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate("Bitcoin", 10), "Bitcoin");
        assert_eq!(truncate("Wrapped Bitcoin", 8), "Wrapped…");
        assert_eq!(truncate("ビットコイン", 3), "ビッ…");
    }

    #[tokio::test]
    async fn late_chart_for_previous_coin_is_ignored() {
        let (mut app, _rx) = app();
        app.open_detail("bitcoin");
        app.open_detail("ethereum");

        app.apply(chart_result("ethereum", 3000.0));
        app.apply(chart_result("bitcoin", 60000.0));

        let series = app.chart.value().unwrap();
        assert_eq!(series.prices[0][1], 3000.0);
    }

    #[tokio::test]
    async fn failed_fetch_surfaces_as_slot_error() {
        let (mut app, mut rx) = app();
        app.sync();
        let fetched = rx.recv().await.unwrap();
        let key = fetched.key.clone();
        app.apply(fetched);

        let slot_error = match key.resource() {
            "global" => app.global.error(),
            _ => app.coins.error(),
        };
        assert!(slot_error.is_some());
    }

    #[tokio::test]
    async fn watchlist_view_only_shows_starred_coins() {
        let (mut app, _rx) = app();
        app.show_watchlist();
        app.toggle_watch("ethereum");

        let key = Resource::CoinList(CoinListParams::page(WATCHLIST_PAGE_SIZE, 1)).cache_key();
        let row = |id: &str| {
            json!({
                "id": id, "symbol": id, "name": id, "image": "",
                "current_price": 1.0, "market_cap": 1.0, "market_cap_rank": 1,
                "fully_diluted_valuation": null, "total_volume": 1.0,
                "high_24h": 1.0, "low_24h": 1.0, "price_change_24h": 0.0,
                "price_change_percentage_24h": 0.0, "market_cap_change_24h": 0.0,
                "market_cap_change_percentage_24h": 0.0, "circulating_supply": 1.0,
                "total_supply": null, "max_supply": null, "ath": 1.0,
                "ath_change_percentage": 0.0, "ath_date": "", "atl": 1.0,
                "atl_change_percentage": 0.0, "atl_date": "", "last_updated": ""
            })
        };
        app.apply(Fetched {
            key,
            result: Ok(Arc::new(json!([row("bitcoin"), row("ethereum")]))),
        });

        let ids: Vec<_> = app.visible_coins().iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, ["ethereum"]);
    }

    #[test]
    fn search_applies_only_after_settling() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let client = DataClient::new("http://127.0.0.1:9").unwrap();
        let mut app = AppState::new(client, Watchlist::load(MemoryStore::new()), tx);

        let t0 = Instant::now();
        app.push_search_char('s', t0);
        app.push_search_char('o', t0 + std::time::Duration::from_millis(100));
        assert!(!app.settle_search(t0 + std::time::Duration::from_millis(200)));
        assert_eq!(app.filter.search, "");
        assert!(app.settle_search(t0 + std::time::Duration::from_millis(450)));
        assert_eq!(app.filter.search, "so");
    }
}
