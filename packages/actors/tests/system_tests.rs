mod common;

use std::error::Error;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use troupe::{
    Actor, ActorContext, ActorError, ActorProcessingErr, ActorSystem, Construct, CreatorSource,
    Props, PropsOptions, PropsResolver, global_registry,
};

use common::{Recorder, expect_event, recorder};

#[derive(Debug, thiserror::Error)]
#[error("refusing to start")]
struct StartError;

#[derive(Clone, Debug)]
enum Cmd {
    Get,
    Fail,
}

/// Counter built from constructor arguments; counts its own constructions.
struct Counter {
    start: usize,
}

impl Actor for Counter {
    type Msg = Cmd;

    async fn receive(&mut self, ctx: &ActorContext, message: Cmd) -> Result<(), ActorProcessingErr> {
        match message {
            Cmd::Get => ctx.reply(self.start)?,
            Cmd::Fail => return Err(Box::new(StartError)),
        }
        Ok(())
    }
}

impl Construct for Counter {
    type Args = (Arc<AtomicUsize>, usize);

    fn construct((constructed, start): Self::Args) -> Result<Self, ActorProcessingErr> {
        constructed.fetch_add(1, Ordering::SeqCst);
        Ok(Counter { start })
    }
}

/// Fails in pre_start.
#[derive(Default)]
struct Reluctant;

impl Actor for Reluctant {
    type Msg = Cmd;

    async fn pre_start(&mut self, _ctx: &ActorContext) -> Result<(), ActorProcessingErr> {
        Err(Box::new(StartError))
    }

    async fn receive(&mut self, _ctx: &ActorContext, _message: Cmd) -> Result<(), ActorProcessingErr> {
        Ok(())
    }
}

/// Records its lifecycle.
struct Lifecycle {
    events: Recorder,
}

impl Actor for Lifecycle {
    type Msg = Cmd;

    async fn pre_start(&mut self, ctx: &ActorContext) -> Result<(), ActorProcessingErr> {
        self.events.record(format!("started {}", ctx.path()));
        Ok(())
    }

    async fn receive(&mut self, _ctx: &ActorContext, _message: Cmd) -> Result<(), ActorProcessingErr> {
        Ok(())
    }

    async fn post_stop(&mut self, ctx: &ActorContext) -> Result<(), ActorProcessingErr> {
        self.events.record(format!("stopped {}", ctx.path()));
        Ok(())
    }
}

#[tokio::test]
async fn test_restart_reuses_constructor_args() -> Result<(), Box<dyn Error>> {
    let system = common::system("ctor-args")?;
    let constructed = Arc::new(AtomicUsize::new(0));
    let props = Props::<Counter>::with_args((constructed.clone(), 5));
    let counter = system.actor_of(&props, "counter").await?;

    counter.tell(Cmd::Fail)?;
    common::eventually(|| {
        let constructed = constructed.clone();
        async move { constructed.load(Ordering::SeqCst) == 2 }
    })
    .await?;

    let start: usize = counter.ask(Cmd::Get, Duration::from_secs(1)).await?;
    assert_eq!(start, 5);

    system.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn test_every_creator_source_spawns() -> Result<(), Box<dyn Error>> {
    let system = common::system("sources")?;
    let constructed = Arc::new(AtomicUsize::new(0));

    let from_type = PropsResolver::new()
        .positional(CreatorSource::<Counter>::with_args((constructed.clone(), 1)))
        .resolve()?;
    let from_options = Props::from_options(
        PropsOptions::new()
            .with_creator(|| Ok(Counter { start: 2 }))
            .with_dispatcher("pinned"),
    )?;
    let from_block = PropsResolver::new()
        .block(|| Ok(Counter { start: 3 }))
        .resolve()?;

    for (props, expected) in [(from_type, 1), (from_options, 2), (from_block, 3)] {
        let counter = system.spawn_anonymous(&props).await?;
        assert!(counter.path().contains("/user/$"));
        let start: usize = counter.ask(Cmd::Get, Duration::from_secs(1)).await?;
        assert_eq!(start, expected);
    }

    system.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn test_name_conflict() -> Result<(), Box<dyn Error>> {
    let system = common::system("conflict")?;
    let props = Props::create(|| Ok(Counter { start: 0 }));

    system.actor_of(&props, "only-one").await?;
    let second = system.actor_of(&props, "only-one").await;
    assert!(matches!(second, Err(ActorError::NameConflict(_))));

    system.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn test_invalid_names_rejected() -> Result<(), Box<dyn Error>> {
    let system = common::system("names")?;
    let props = Props::create(|| Ok(Counter { start: 0 }));

    for name in ["", "a/b", "$reserved"] {
        let result = system.actor_of(&props, name).await;
        assert!(matches!(result, Err(ActorError::Configuration(_))), "{name:?}");
    }

    system.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn test_startup_failures() -> Result<(), Box<dyn Error>> {
    let system = common::system("startup")?;

    let failing_creator = Props::<Counter>::create(|| Err(StartError.into()));
    let result = system.actor_of(&failing_creator, "broken").await;
    assert!(matches!(result, Err(ActorError::ActorInitialization { .. })));

    let result = system.actor_of(&Props::<Reluctant>::of(), "reluctant").await;
    assert!(matches!(result, Err(ActorError::ActorInitialization { .. })));

    system.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn test_system_names_are_exclusive() -> Result<(), Box<dyn Error>> {
    let name = common::unique("exclusive");
    let system = ActorSystem::create(name.clone())?;
    assert!(global_registry().is_live(&name));
    assert!(matches!(
        ActorSystem::create(name.clone()),
        Err(ActorError::NameConflict(_))
    ));

    system.shutdown().await;
    assert!(!global_registry().is_live(&name));
    let again = ActorSystem::create(name)?;
    again.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn test_shutdown_stops_top_level_actors() -> Result<(), Box<dyn Error>> {
    let system = common::system("shutdown")?;
    let (events, mut rx) = recorder();
    let props = Props::create(move || {
        Ok(Lifecycle {
            events: events.clone(),
        })
    });

    let actor = system.actor_of(&props, "lifecycle").await?;
    let path = actor.path();
    assert_eq!(path, format!("{}/user/lifecycle", system.name()));
    expect_event(&mut rx, &format!("started {path}")).await?;

    system.shutdown().await;
    expect_event(&mut rx, &format!("stopped {path}")).await?;
    assert!(!actor.is_alive());
    assert!(matches!(
        system.actor_of(&props, "late").await,
        Err(ActorError::Terminated(_))
    ));
    Ok(())
}
