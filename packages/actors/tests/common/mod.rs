#![allow(dead_code)]

use std::error::Error;
use std::future::Future;
use std::time::Duration;

use tokio::sync::mpsc;
use troupe::{ActorError, ActorSystem};
use ulid::Ulid;

/// How long a test waits for an expected event.
pub const WAIT: Duration = Duration::from_secs(3);

/// A system with a name no other test uses.
pub fn system(prefix: &str) -> Result<ActorSystem, ActorError> {
    ActorSystem::create(unique(prefix))
}

pub fn unique(prefix: &str) -> String {
    format!("{prefix}-{}", Ulid::new())
}

/// Cloneable sink actors write lifecycle events to.
#[derive(Clone)]
pub struct Recorder(mpsc::UnboundedSender<String>);

impl Recorder {
    pub fn record(&self, event: impl Into<String>) {
        let _ = self.0.send(event.into());
    }
}

pub type Events = mpsc::UnboundedReceiver<String>;

pub fn recorder() -> (Recorder, Events) {
    let (tx, rx) = mpsc::unbounded_channel();
    (Recorder(tx), rx)
}

pub async fn next_event(events: &mut Events) -> Result<String, Box<dyn Error>> {
    tokio::time::timeout(WAIT, events.recv())
        .await?
        .ok_or_else(|| "recorder closed".into())
}

/// Skip events until `expected` arrives.
pub async fn expect_event(events: &mut Events, expected: &str) -> Result<(), Box<dyn Error>> {
    let wait = async {
        while let Some(event) = events.recv().await {
            if event == expected {
                return true;
            }
        }
        false
    };
    match tokio::time::timeout(WAIT, wait).await {
        Ok(true) => Ok(()),
        _ => Err(format!("event {expected:?} never arrived").into()),
    }
}

/// Everything recorded so far, without waiting.
pub fn drain(events: &mut Events) -> Vec<String> {
    let mut drained = Vec::new();
    while let Ok(event) = events.try_recv() {
        drained.push(event);
    }
    drained
}

/// How often `event` occurs in `events`.
pub fn occurrences(events: &[String], event: &str) -> usize {
    events.iter().filter(|e| e.as_str() == event).count()
}

/// Collect exactly `count` events.
pub async fn take_events(events: &mut Events, count: usize) -> Result<Vec<String>, Box<dyn Error>> {
    let mut taken = Vec::with_capacity(count);
    for _ in 0..count {
        taken.push(next_event(events).await?);
    }
    Ok(taken)
}

/// Poll `condition` until it holds.
pub async fn eventually<F, Fut>(mut condition: F) -> Result<(), Box<dyn Error>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + WAIT;
    while tokio::time::Instant::now() < deadline {
        if condition().await {
            return Ok(());
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    Err("condition never held".into())
}
