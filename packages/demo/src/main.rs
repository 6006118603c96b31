//! Walkthrough of the troupe facade: a supervised parent, a routed pool of
//! workers, request/reply and piping a future's result into an actor.
//!
//! Set `TROUPE_CONFIG` to a JSON file to override the system defaults.

use std::error::Error;
use std::time::Duration;

use troupe::{
    Actor, ActorContext, ActorProcessingErr, ActorSystem, FailureCause, PipeTo,
    Props, RouterConfig, SupervisorDecision, SupervisorStrategy, SystemConfig,
};

#[derive(Debug, thiserror::Error)]
#[error("quote service unavailable")]
struct QuoteUnavailable;

#[derive(Debug, thiserror::Error)]
#[error("ledger corrupted")]
struct Corrupted;

#[derive(Clone, Debug)]
enum Ledger {
    Add(i64),
    Total,
    Corrupt,
}

/// Keeps a running total; loses it when restarted.
#[derive(Default)]
struct Account {
    total: i64,
}

impl Actor for Account {
    type Msg = Ledger;

    async fn receive(&mut self, ctx: &ActorContext, message: Ledger) -> Result<(), ActorProcessingErr> {
        match message {
            Ledger::Add(amount) => self.total += amount,
            Ledger::Total => ctx.reply(self.total)?,
            Ledger::Corrupt => return Err(Box::new(Corrupted)),
        }
        Ok(())
    }

    async fn post_restart(
        &mut self,
        ctx: &ActorContext,
        cause: &FailureCause,
    ) -> Result<(), ActorProcessingErr> {
        tracing::info!(path = %ctx.path(), %cause, "account restarted with a fresh total");
        Ok(())
    }
}

/// Owns the account and restarts it on corruption.
#[derive(Default)]
struct Bank;

impl Actor for Bank {
    type Msg = Ledger;

    fn supervisor_strategy() -> SupervisorStrategy {
        SupervisorStrategy::one_for_one(3, Duration::from_secs(60), |cause| {
            cause.is::<Corrupted>().then_some(SupervisorDecision::Restart)
        })
    }

    async fn pre_start(&mut self, ctx: &ActorContext) -> Result<(), ActorProcessingErr> {
        ctx.actor_of(&Props::<Account>::of(), "account").await?;
        Ok(())
    }

    async fn receive(&mut self, ctx: &ActorContext, message: Ledger) -> Result<(), ActorProcessingErr> {
        for account in ctx.children() {
            account.tell(message.clone())?;
        }
        Ok(())
    }
}

/// Routee answering quote requests with its own path.
#[derive(Default)]
struct QuoteWorker;

impl Actor for QuoteWorker {
    type Msg = String;

    async fn receive(&mut self, ctx: &ActorContext, symbol: String) -> Result<(), ActorProcessingErr> {
        tracing::info!(path = %ctx.path(), %symbol, "quoting");
        ctx.reply(format!("{symbol}: 42.00"))?;
        Ok(())
    }
}

/// Logs lines piped to it. Piped failures are not strings and get dropped.
#[derive(Default)]
struct Printer;

impl Actor for Printer {
    type Msg = String;

    async fn receive(&mut self, _ctx: &ActorContext, line: String) -> Result<(), ActorProcessingErr> {
        tracing::info!(%line, "printer");
        Ok(())
    }
}

async fn ledger_demo(system: &ActorSystem) -> Result<(), Box<dyn Error>> {
    system.actor_of(&Props::<Bank>::of(), "bank").await?;
    let account = system.actor_selection("/user/bank/account");

    account.tell(Ledger::Add(100))?;
    account.tell(Ledger::Add(-30))?;
    let total: i64 = account.ask(Ledger::Total, Duration::from_secs(1)).await?;
    tracing::info!(total, "balance before corruption");

    account.tell(Ledger::Corrupt)?;
    let total: i64 = account.ask(Ledger::Total, Duration::from_secs(1)).await?;
    tracing::info!(total, "balance after restart");
    Ok(())
}

async fn quote_demo(system: &ActorSystem) -> Result<(), Box<dyn Error>> {
    let props = Props::<QuoteWorker>::of().with_router(RouterConfig::round_robin(3))?;
    let quotes = system.actor_of(&props, "quotes").await?;

    for symbol in ["ACME", "INIT", "RUST"] {
        let quote: String = quotes.ask(symbol.to_string(), Duration::from_secs(1)).await?;
        tracing::info!(%quote, "received quote");
    }

    let routees = quotes.current_routees(Duration::from_secs(1)).await?;
    tracing::info!(count = routees.len(), "quote routees");
    Ok(())
}

async fn pipe_demo(system: &ActorSystem) -> Result<(), Box<dyn Error>> {
    let printer = system.actor_of(&Props::<Printer>::of(), "printer").await?;

    async { Ok::<_, QuoteUnavailable>("piped hello".to_string()) }
        .pipe_to(&printer)
        .await?;
    async { Err::<String, _>(QuoteUnavailable) }
        .pipe_to(&printer)
        .await?;

    // Let the printer drain before shutdown.
    tokio::time::sleep(Duration::from_millis(100)).await;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    let config = SystemConfig::from_env()?;
    let system = ActorSystem::with_config("demo", config)?;

    ledger_demo(&system).await?;
    quote_demo(&system).await?;
    pipe_demo(&system).await?;

    system.shutdown().await;
    Ok(())
}
