use crate::resource::CacheKey;

/// Holds the value for whichever key the view currently wants.
///
/// Results for a key that is no longer wanted are dropped, so a slow response
/// for an old selection can never overwrite a newer one. The previous value
/// stays visible while the next key loads.
#[derive(Debug, Clone)]
pub struct LatestSlot<T> {
    wanted: Option<CacheKey>,
    current: Option<(CacheKey, T)>,
    error: Option<String>,
    loading: bool,
}

impl<T> Default for LatestSlot<T> {
    fn default() -> Self {
        Self { wanted: None, current: None, error: None, loading: false }
    }
}

impl<T> LatestSlot<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark `key` as wanted. Returns true when it differs from the previous
    /// wanted key, i.e. the caller should start a fetch.
    pub fn request(&mut self, key: CacheKey) -> bool {
        if self.wanted.as_ref() == Some(&key) {
            return false;
        }
        self.wanted = Some(key);
        self.error = None;
        self.loading = true;
        true
    }

    /// Force the next `request` for the current key to report a change.
    pub fn reset(&mut self) {
        self.wanted = None;
    }

    /// Apply a finished fetch. Returns false if `key` is stale and was ignored.
    pub fn resolve(&mut self, key: &CacheKey, result: Result<T, String>) -> bool {
        if self.wanted.as_ref() != Some(key) {
            return false;
        }
        self.loading = false;
        match result {
            Ok(value) => {
                self.current = Some((key.clone(), value));
                self.error = None;
            }
            Err(message) => self.error = Some(message),
        }
        true
    }

    pub fn wanted(&self) -> Option<&CacheKey> {
        self.wanted.as_ref()
    }

    pub fn value(&self) -> Option<&T> {
        self.current.as_ref().map(|(_, v)| v)
    }

    /// Value only if it belongs to the wanted key.
    pub fn current_value(&self) -> Option<&T> {
        match (&self.current, &self.wanted) {
            (Some((k, v)), Some(w)) if k == w => Some(v),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }
}
