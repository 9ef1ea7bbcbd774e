//! Local filtering, search debounce and paging for the markets table.
//! Nothing here touches the network.

use std::time::{Duration, Instant};

use crate::config::{defaults, PER_PAGE_OPTIONS, SEARCH_DEBOUNCE};
use crate::types::CoinMarket;

const LARGE_CAP: f64 = 10e9;
const MID_CAP: f64 = 1e9;

// ---------------------------------------------------------------------------
// Filters
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MarketCapFilter {
    #[default]
    All,
    /// above 10B
    Large,
    /// 1B to 10B inclusive
    Mid,
    /// below 1B
    Small,
}

impl MarketCapFilter {
    pub fn matches(self, market_cap: f64) -> bool {
        match self {
            MarketCapFilter::All => true,
            MarketCapFilter::Large => market_cap > LARGE_CAP,
            MarketCapFilter::Mid => (MID_CAP..=LARGE_CAP).contains(&market_cap),
            MarketCapFilter::Small => market_cap < MID_CAP,
        }
    }

    pub fn next(self) -> Self {
        match self {
            MarketCapFilter::All => MarketCapFilter::Large,
            MarketCapFilter::Large => MarketCapFilter::Mid,
            MarketCapFilter::Mid => MarketCapFilter::Small,
            MarketCapFilter::Small => MarketCapFilter::All,
        }
    }
}

impl std::fmt::Display for MarketCapFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            MarketCapFilter::All => "All Market Caps",
            MarketCapFilter::Large => "Large Cap (>$10B)",
            MarketCapFilter::Mid => "Mid Cap ($1B-$10B)",
            MarketCapFilter::Small => "Small Cap (<$1B)",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChangeFilter {
    #[default]
    All,
    Gainers,
    Losers,
}

impl ChangeFilter {
    /// Zero change is neither a gain nor a loss.
    pub fn matches(self, change_pct: f64) -> bool {
        match self {
            ChangeFilter::All => true,
            ChangeFilter::Gainers => change_pct > 0.0,
            ChangeFilter::Losers => change_pct < 0.0,
        }
    }

    pub fn next(self) -> Self {
        match self {
            ChangeFilter::All => ChangeFilter::Gainers,
            ChangeFilter::Gainers => ChangeFilter::Losers,
            ChangeFilter::Losers => ChangeFilter::All,
        }
    }
}

impl std::fmt::Display for ChangeFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ChangeFilter::All => "All Changes",
            ChangeFilter::Gainers => "Gainers",
            ChangeFilter::Losers => "Losers",
        };
        write!(f, "{s}")
    }
}

/// Case-insensitive substring match on name or symbol. A blank term matches all.
pub fn matches_search(coin: &CoinMarket, term: &str) -> bool {
    let term = term.trim().to_lowercase();
    term.is_empty()
        || coin.name.to_lowercase().contains(&term)
        || coin.symbol.to_lowercase().contains(&term)
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CoinFilter {
    pub search: String,
    pub market_cap: MarketCapFilter,
    pub change: ChangeFilter,
}

impl CoinFilter {
    pub fn matches(&self, coin: &CoinMarket) -> bool {
        self.market_cap.matches(coin.market_cap)
            && self.change.matches(coin.price_change_percentage_24h)
            && matches_search(coin, &self.search)
    }

    /// Matching rows in their original order.
    pub fn apply<'a>(&self, coins: &'a [CoinMarket]) -> Vec<&'a CoinMarket> {
        coins.iter().filter(|c| self.matches(c)).collect()
    }

    pub fn is_active(&self) -> bool {
        !self.search.trim().is_empty()
            || self.market_cap != MarketCapFilter::All
            || self.change != ChangeFilter::All
    }
}

/// Coins on the watchlist, then narrowed by search.
pub fn watchlist_view<'a>(
    coins: &'a [CoinMarket],
    is_watched: impl Fn(&str) -> bool,
    search: &str,
) -> Vec<&'a CoinMarket> {
    coins
        .iter()
        .filter(|c| is_watched(c.id.as_str()) && matches_search(c, search))
        .collect()
}

// ---------------------------------------------------------------------------
// Debounce
// ---------------------------------------------------------------------------

/// Releases the latest input once it has sat unchanged for the delay.
/// Time is passed in so the UI loop and tests share one clock.
#[derive(Debug, Clone)]
pub struct Debouncer {
    delay: Duration,
    pending: Option<(String, Instant)>,
}

impl Default for Debouncer {
    fn default() -> Self {
        Self::new(SEARCH_DEBOUNCE)
    }
}

impl Debouncer {
    pub fn new(delay: Duration) -> Self {
        Self { delay, pending: None }
    }

    pub fn input(&mut self, value: impl Into<String>, now: Instant) {
        self.pending = Some((value.into(), now));
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// The settled value, once. None while still inside the delay.
    pub fn settle(&mut self, now: Instant) -> Option<String> {
        match &self.pending {
            Some((_, at)) if now.duration_since(*at) >= self.delay => {
                self.pending.take().map(|(v, _)| v)
            }
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Pagination
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    pub page: u32,
    pub per_page: u32,
}

impl Default for Pagination {
    fn default() -> Self {
        Self { page: defaults::PAGE, per_page: defaults::PER_PAGE }
    }
}

impl Pagination {
    /// Page sizes outside the offered options are ignored.
    pub fn set_per_page(&mut self, per_page: u32) {
        if PER_PAGE_OPTIONS.contains(&per_page) {
            self.per_page = per_page;
            self.page = 1;
        }
    }

    pub fn cycle_per_page(&mut self) {
        let idx = PER_PAGE_OPTIONS.iter().position(|&p| p == self.per_page).unwrap_or(0);
        let next = PER_PAGE_OPTIONS[(idx + 1) % PER_PAGE_OPTIONS.len()];
        self.set_per_page(next);
    }

    pub fn total_pages(&self, total: u64) -> u32 {
        let per_page = u64::from(self.per_page.max(1));
        total.div_ceil(per_page).max(1).min(u64::from(u32::MAX)) as u32
    }

    /// With a known total, stop at the last page. Without one, only a full
    /// page suggests there may be more.
    pub fn has_next(&self, total: Option<u64>, last_page_len: usize) -> bool {
        match total {
            Some(total) => self.page < self.total_pages(total),
            None => last_page_len >= self.per_page as usize,
        }
    }

    pub fn has_prev(&self) -> bool {
        self.page > 1
    }

    pub fn next(&mut self, total: Option<u64>, last_page_len: usize) -> bool {
        if self.has_next(total, last_page_len) {
            self.page += 1;
            true
        } else {
            false
        }
    }

    pub fn prev(&mut self) -> bool {
        if self.has_prev() {
            self.page -= 1;
            true
        } else {
            false
        }
    }

    /// 1-based rank of the first row on the current page.
    pub fn first_rank(&self) -> u64 {
        u64::from(self.page - 1) * u64::from(self.per_page) + 1
    }
}
