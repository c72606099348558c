use std::fmt;

use async_trait::async_trait;
use tracing::debug;

use crate::terms::{SEARCH_TERMS, TermSource};

/// Path every generated request targets.
pub const SEARCH_PATH: &str = "/search";

/// Aggregation label attached to every generated request, whatever the term.
pub const SEARCH_LABEL: &str = "/search";

/// Client hook a generated request is dispatched through.
///
/// The implementation owns timing, error classification and reporting; the
/// generator hands back whatever outcome it produces without inspecting it.
#[async_trait]
pub trait SearchClient: Send {
    type Outcome: Send;

    /// Issue `GET path`, recording the result under `label`.
    async fn send_get(&mut self, path: &str, label: &str) -> Self::Outcome;
}

/// One outbound search, built per invocation and dropped after dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchRequest {
    term: &'static str,
    path: String,
}

impl SearchRequest {
    pub fn for_term(term: &'static str) -> Self {
        Self {
            term,
            path: format!("{SEARCH_PATH}?q={term}"),
        }
    }

    pub fn term(&self) -> &'static str {
        self.term
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn label(&self) -> &'static str {
        SEARCH_LABEL
    }
}

impl fmt::Display for SearchRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "GET {} [{}]", self.path, self.label())
    }
}

/// Stateless generator of search traffic over the fixed term set.
#[derive(Debug, Clone, Copy)]
pub struct SearchTrafficGenerator {
    terms: &'static [&'static str],
}

impl SearchTrafficGenerator {
    pub const fn new() -> Self {
        Self {
            terms: &SEARCH_TERMS,
        }
    }

    /// Choose the next term and build its request without sending it.
    pub fn next_request<S>(&self, source: &mut S) -> SearchRequest
    where
        S: TermSource + ?Sized,
    {
        let index = source.pick(self.terms.len()) % self.terms.len();
        SearchRequest::for_term(self.terms[index])
    }

    /// Pick a term and dispatch `GET /search?q=<term>` through `client`,
    /// labelled `/search`. Returns the client's own outcome untouched.
    pub async fn generate_request<C, S>(&self, client: &mut C, source: &mut S) -> C::Outcome
    where
        C: SearchClient,
        S: TermSource + Send,
    {
        let request = self.next_request(source);
        debug!(term = request.term(), label = request.label(), "dispatching search");
        client.send_get(request.path(), request.label()).await
    }
}

impl Default for SearchTrafficGenerator {
    fn default() -> Self {
        Self::new()
    }
}
