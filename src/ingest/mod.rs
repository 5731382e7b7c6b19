/// Upstream SIATA API access.
///
/// `fetch` owns transport concerns (timeouts, retries, backoff); `siata`
/// owns the URL layout and the shape of each JSON document.

pub mod fetch;
pub mod siata;

#[cfg(test)]
pub(crate) mod fixtures;
