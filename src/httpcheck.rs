//! HTTP checker: polls a child's health endpoint and writes a RESTART
//! message once too many consecutive checks fail.
//!
//! `original_source/ncolony/httpcheck.py`'s `State` class drives this with
//! a chain of Deferred continuations (`_maybeCheck`/`_maybeReset`) around a
//! `_ScoreCard`. Continuations don't have a natural Rust analogue here, so
//! this is reworked as the explicit state machine the continuations were
//! encoding: each poll moves `ConnState` forward and updates `ScoreCard`
//! directly.

use std::path::Path;
use std::time::Duration;

use serde_json::Value;
use strum::Display;
use tokio::time::Instant;

use crate::message::{self, Message};

const USER_AGENT: &str = concat!("ward-httpcheck/", env!("CARGO_PKG_VERSION"));

/// What the checker currently believes about one name. Named for the
/// states the original's continuation chain moved through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum ConnState {
    /// No `httpcheck` extension has been parsed yet.
    Initial,
    /// A URL is configured; waiting for the next check deadline.
    HasUrl,
    /// A GET is outstanding.
    InPing,
    /// The bad counter exceeded `maxBad`; the next tick reports stale.
    Bad,
    /// Closed (the name vanished from the config dir); won't check again.
    Closed,
}

/// Tracks consecutive good/bad polls the way `_ScoreCard` does, so a
/// single blip doesn't trigger a restart.
#[derive(Debug, Clone, Copy)]
pub struct ScoreCard {
    max_bad: u32,
    bad: u32,
}

impl ScoreCard {
    pub fn new(max_bad: u32) -> Self {
        Self { max_bad, bad: 0 }
    }

    pub fn record(&mut self, healthy: bool) {
        if healthy {
            self.bad = 0;
        } else {
            self.bad += 1;
        }
    }

    /// `_ScoreCard.isBad`: strictly more failures than `maxBad`, not
    /// `>= maxBad` — `maxBad` failures in a row is still tolerated.
    pub fn is_bad(&self) -> bool {
        self.bad > self.max_bad
    }

    pub fn bad_count(&self) -> u32 {
        self.bad
    }
}

#[derive(Debug, Clone)]
pub struct HttpCheckConfig {
    pub url: String,
    pub period: Duration,
    pub timeout: Duration,
    pub grace: f64,
    pub max_bad: u32,
}

impl HttpCheckConfig {
    /// Parse an `httpcheck` extension object: `{url, period, timeout,
    /// grace, maxBad}`, all required per spec.md §6.
    pub fn from_json(value: &Value) -> Option<Self> {
        let url = value.get("url")?.as_str()?.to_string();
        let period = Duration::from_secs_f64(value.get("period")?.as_f64()?);
        let raw_timeout = Duration::from_secs_f64(value.get("timeout")?.as_f64()?);
        let grace = value.get("grace")?.as_f64()?;
        let max_bad = value.get("maxBad")?.as_u64()? as u32;
        Some(Self {
            url,
            // `self.timeout = min(self.period, config['timeout'])`
            timeout: raw_timeout.min(period),
            period,
            grace,
            max_bad,
        })
    }
}

pub struct HttpChecker {
    config: HttpCheckConfig,
    client: reqwest::Client,
    state: ConnState,
    score: ScoreCard,
    next_check: Instant,
}

impl HttpChecker {
    /// A fresh checker for a just-(re)parsed config: state starts at
    /// `HasUrl` with the first check due after the startup grace window
    /// (`grace * period`), matching `_maybeReset`'s `nextCheck` setup.
    pub fn new(config: HttpCheckConfig, client: reqwest::Client, now: Instant) -> Self {
        let next_check = now + config.period.mul_f64(config.grace);
        let score = ScoreCard::new(config.max_bad);
        Self {
            config,
            client,
            state: ConnState::HasUrl,
            score,
            next_check,
        }
    }

    pub fn state(&self) -> ConnState {
        self.state
    }

    pub fn score(&self) -> ScoreCard {
        self.score
    }

    /// One check-tick. If the checker is `Bad`, this reports stale (without
    /// issuing a request) and falls back to `HasUrl` — `_maybeCheck`'s
    /// `if self.card.isBad(): self._reset(); return True`. Otherwise, if
    /// the next-check deadline has passed, issues a GET and advances the
    /// state from the result; returns `false` either way, since a bad
    /// verdict isn't reported until the tick *after* the threshold was
    /// crossed.
    pub async fn tick(&mut self, now: Instant) -> bool {
        if self.state == ConnState::Closed {
            return false;
        }
        if self.state == ConnState::Bad {
            self.state = ConnState::HasUrl;
            return true;
        }
        if now < self.next_check {
            return false;
        }
        self.next_check = now + self.config.period;
        self.state = ConnState::InPing;
        let healthy = self.ping().await;
        self.score.record(healthy);
        self.state = if self.score.is_bad() {
            ConnState::Bad
        } else {
            ConnState::HasUrl
        };
        false
    }

    async fn ping(&self) -> bool {
        let request = self
            .client
            .get(&self.config.url)
            .header(reqwest::header::USER_AGENT, USER_AGENT)
            .send();
        match tokio::time::timeout(self.config.timeout, request).await {
            Ok(Ok(response)) => response.status().is_success(),
            _ => false,
        }
    }

    /// Run one tick and, if it reports stale, write a RESTART message for
    /// `name` into `messages_dir`.
    pub async fn check_and_restart(
        &mut self,
        name: &str,
        now: Instant,
        messages_dir: &Path,
    ) -> std::io::Result<bool> {
        if !self.tick(now).await {
            return Ok(false);
        }
        message::write_message(messages_dir, &Message::Restart { name: name.to_string() }).await?;
        Ok(true)
    }

    /// Cancel any pending interest and stop checking. Corresponds to the
    /// original's `close()`; called when a name's `httpcheck` extension
    /// disappears or the name itself is removed from the config dir.
    pub fn close(&mut self) {
        self.state = ConnState::Closed;
    }
}
