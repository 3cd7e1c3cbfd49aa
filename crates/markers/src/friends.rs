use clustering::model::{Pinory, PinoryType, UserId};
use futures_util::future::BoxFuture;
use serde::Deserialize;

use crate::renderable::{MarkerHandle, MarkerProps};
use crate::session::{MapError, MapSession, MapSurface, MarkerView, PoolToken};

pub const FRIEND_PINORIES_PATH: &str = "/api/friends/pinories";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    Http(String),
    Status(u16),
    Decode(String),
}

impl std::fmt::Display for FetchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FetchError::Http(msg) => write!(f, "could not reach the server: {msg}"),
            FetchError::Status(code) => write!(f, "server answered with status {code}"),
            FetchError::Decode(msg) => write!(f, "unexpected response: {msg}"),
        }
    }
}

impl std::error::Error for FetchError {}

/// Where friend pinories come from.
pub trait FriendSource {
    fn fetch_friend_pinories(&self) -> BoxFuture<'_, Result<Vec<Pinory>, FetchError>>;
}

#[derive(Deserialize)]
#[serde(untagged)]
enum FriendPinoriesBody {
    List(Vec<Pinory>),
    Wrapped { pinories: Vec<Pinory> },
}

/// Parses a friend-pinories response body. Every entry is marked as a
/// friend pinory regardless of what the payload says.
pub fn parse_friend_pinories(body: &str) -> Result<Vec<Pinory>, FetchError> {
    let parsed: FriendPinoriesBody =
        serde_json::from_str(body).map_err(|e| FetchError::Decode(e.to_string()))?;
    let mut pinories = match parsed {
        FriendPinoriesBody::List(list) => list,
        FriendPinoriesBody::Wrapped { pinories } => pinories,
    };
    for p in &mut pinories {
        p.pinory_type = PinoryType::Friend;
    }
    Ok(pinories)
}

/// Fetches `GET {base_url}/api/friends/pinories`.
pub struct HttpFriendSource {
    base_url: String,
    client: reqwest::Client,
}

impl HttpFriendSource {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(base_url, reqwest::Client::new())
    }

    pub fn with_client(base_url: impl Into<String>, client: reqwest::Client) -> Self {
        Self {
            base_url: base_url.into(),
            client,
        }
    }

    pub fn url(&self) -> String {
        format!("{}{FRIEND_PINORIES_PATH}", self.base_url.trim_end_matches('/'))
    }
}

impl FriendSource for HttpFriendSource {
    fn fetch_friend_pinories(&self) -> BoxFuture<'_, Result<Vec<Pinory>, FetchError>> {
        let url = self.url();
        Box::pin(async move {
            let resp = self
                .client
                .get(&url)
                .send()
                .await
                .map_err(|e| FetchError::Http(e.to_string()))?;

            if !resp.status().is_success() {
                return Err(FetchError::Status(resp.status().as_u16()));
            }

            let body = resp
                .text()
                .await
                .map_err(|e| FetchError::Http(e.to_string()))?;
            parse_friend_pinories(&body)
        })
    }
}

/// Fixed in-memory source.
#[derive(Debug, Clone, Default)]
pub struct StaticFriendSource {
    result: Option<Result<Vec<Pinory>, FetchError>>,
}

impl StaticFriendSource {
    pub fn new(pinories: Vec<Pinory>) -> Self {
        Self {
            result: Some(Ok(pinories)),
        }
    }

    pub fn failing(err: FetchError) -> Self {
        Self {
            result: Some(Err(err)),
        }
    }
}

impl FriendSource for StaticFriendSource {
    fn fetch_friend_pinories(&self) -> BoxFuture<'_, Result<Vec<Pinory>, FetchError>> {
        let result = self.result.clone().unwrap_or_else(|| Ok(Vec::new()));
        Box::pin(async move { result })
    }
}

/// Identifies one outstanding fetch. Tickets from before the latest
/// enable/disable are stale.
#[derive(Debug, PartialEq, Eq)]
pub struct FetchTicket {
    generation: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    /// Data stored and rendered; the number of visible markers.
    Applied(usize),
    /// The ticket was outdated; nothing changed.
    Stale,
}

/// Non-clustered layer of friend pinories in its own marker pool.
///
/// Data is fetched once per session, unfiltered. Selecting a friend filters
/// on the client. Every change re-renders the full set.
#[derive(Debug)]
pub struct FriendOverlay {
    token: PoolToken,
    enabled: bool,
    generation: u64,
    fetched: bool,
    in_flight: bool,
    pinories: Vec<Pinory>,
    selected_friend: Option<UserId>,
    markers: Vec<MarkerHandle>,
}

impl FriendOverlay {
    pub fn new(token: PoolToken) -> Self {
        Self {
            token,
            enabled: false,
            generation: 0,
            fetched: false,
            in_flight: false,
            pinories: Vec::new(),
            selected_friend: None,
            markers: Vec::new(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// A fetch has been requested and not completed yet.
    pub fn is_loading(&self) -> bool {
        self.in_flight
    }

    pub fn selected_friend(&self) -> Option<&str> {
        self.selected_friend.as_deref()
    }

    pub fn marker_count(&self) -> usize {
        self.markers.len()
    }

    /// Friend pinories after the friend filter.
    pub fn visible(&self) -> Vec<&Pinory> {
        self.pinories
            .iter()
            .filter(|p| match &self.selected_friend {
                Some(friend) => p.creator.as_ref().is_some_and(|c| &c.id == friend),
                None => true,
            })
            .collect()
    }

    /// Turns the layer on. Returns a ticket when data still has to be
    /// fetched; otherwise renders what is already loaded.
    ///
    /// Calling it again while enabled after a failed fetch retries: a fresh
    /// ticket is issued and older ones become stale.
    pub fn enable<M: MapSurface, V: MarkerView>(&mut self, session: &mut MapSession<M, V>) -> Option<FetchTicket> {
        if self.enabled && (self.fetched || self.in_flight) {
            return None;
        }
        let retry = self.enabled;
        self.enabled = true;
        self.generation += 1;

        if self.fetched {
            self.render(session);
            return None;
        }
        if retry {
            tracing::debug!(generation = self.generation, "retrying friend fetch");
        }
        self.in_flight = true;
        Some(FetchTicket {
            generation: self.generation,
        })
    }

    /// Turns the layer off and removes its markers. Outstanding tickets
    /// become stale.
    pub fn disable<M: MapSurface, V: MarkerView>(&mut self, session: &mut MapSession<M, V>) {
        if !self.enabled {
            return;
        }
        self.enabled = false;
        self.generation += 1;
        self.in_flight = false;
        self.teardown(session);
    }

    /// Applies a finished fetch. Errors leave the previous data in place and
    /// are handed back for the user-facing notification.
    pub fn complete_fetch<M: MapSurface, V: MarkerView>(
        &mut self,
        session: &mut MapSession<M, V>,
        ticket: FetchTicket,
        result: Result<Vec<Pinory>, FetchError>,
    ) -> Result<FetchOutcome, FetchError> {
        if !self.enabled || ticket.generation != self.generation {
            tracing::debug!(ticket = ticket.generation, current = self.generation, "discarding stale friend fetch");
            return Ok(FetchOutcome::Stale);
        }
        self.in_flight = false;

        let pinories = result.inspect_err(|err| {
            tracing::warn!(error = %err, "friend pinories fetch failed");
        })?;
        tracing::info!(count = pinories.len(), "loaded friend pinories");
        self.pinories = pinories;
        self.fetched = true;
        Ok(FetchOutcome::Applied(self.render(session)))
    }

    /// Enables the layer and, if needed, fetches from `source`.
    pub async fn load<M, V, S>(
        &mut self,
        session: &mut MapSession<M, V>,
        source: &S,
    ) -> Result<FetchOutcome, FetchError>
    where
        M: MapSurface,
        V: MarkerView,
        S: FriendSource + ?Sized,
    {
        let Some(ticket) = self.enable(session) else {
            return Ok(FetchOutcome::Applied(self.markers.len()));
        };
        let result = source.fetch_friend_pinories().await;
        self.complete_fetch(session, ticket, result)
    }

    pub fn select_friend<M: MapSurface, V: MarkerView>(
        &mut self,
        session: &mut MapSession<M, V>,
        friend: Option<UserId>,
    ) -> usize {
        if self.selected_friend == friend {
            return self.markers.len();
        }
        self.selected_friend = friend;
        if !self.enabled {
            return 0;
        }
        self.render(session)
    }

    pub fn teardown<M: MapSurface, V: MarkerView>(&mut self, session: &mut MapSession<M, V>) {
        let mut pool = session.pool(&self.token);
        for handle in self.markers.drain(..) {
            if let Err(err) = pool.destroy(handle) {
                tracing::warn!(error = %err, "failed to destroy friend marker");
            }
        }
    }

    fn render<M: MapSurface, V: MarkerView>(&mut self, session: &mut MapSession<M, V>) -> usize {
        self.teardown(session);
        if !session.is_ready() {
            return 0;
        }

        let props: Vec<MarkerProps> = self.visible().into_iter().map(|p| MarkerProps::pin(p, false)).collect();
        let mut pool = session.pool(&self.token);
        for p in props {
            match pool.create(p) {
                Ok(handle) => self.markers.push(handle),
                Err(MapError::Detached) => {
                    tracing::warn!("map detached while rendering friend markers");
                    break;
                }
                Err(err) => tracing::warn!(error = %err, "failed to create friend marker"),
            }
        }
        self.markers.len()
    }
}
