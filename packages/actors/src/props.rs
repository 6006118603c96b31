//! Props: immutable descriptions of how to create an actor.

use std::any::type_name;
use std::sync::Arc;

use ractor::ActorProcessingErr;
use troupe_core::{ActorError, ActorResult, RouterConfig};

use crate::actor::{Actor, Construct};

/// Factory producing a fresh actor instance.
pub type Creator<A> = Arc<dyn Fn() -> Result<A, ActorProcessingErr> + Send + Sync>;

/// Where an actor instance comes from.
pub enum CreatorSource<A: Actor> {
    /// A type and the constructor arguments captured for it.
    FromType {
        type_name: &'static str,
        construct: Creator<A>,
    },
    /// A factory closure passed positionally.
    FromFactory(Creator<A>),
    /// The `creator` entry of [`PropsOptions`].
    FromOptions(Creator<A>),
}

impl<A: Actor> CreatorSource<A> {
    /// `A::default()` on every instantiation.
    pub fn of_type() -> Self
    where
        A: Default,
    {
        CreatorSource::FromType {
            type_name: type_name::<A>(),
            construct: Arc::new(|| Ok::<A, ActorProcessingErr>(A::default())),
        }
    }

    /// `A::construct(args.clone())` on every instantiation.
    pub fn with_args(args: A::Args) -> Self
    where
        A: Construct,
    {
        CreatorSource::FromType {
            type_name: type_name::<A>(),
            construct: Arc::new(move || A::construct(args.clone())),
        }
    }

    pub fn factory<F>(factory: F) -> Self
    where
        F: Fn() -> Result<A, ActorProcessingErr> + Send + Sync + 'static,
    {
        CreatorSource::FromFactory(Arc::new(factory))
    }

    fn creator(&self) -> &Creator<A> {
        match self {
            CreatorSource::FromType { construct, .. } => construct,
            CreatorSource::FromFactory(creator) | CreatorSource::FromOptions(creator) => creator,
        }
    }

    fn describe(&self) -> &'static str {
        match self {
            CreatorSource::FromType { type_name, .. } => *type_name,
            CreatorSource::FromFactory(_) => "factory",
            CreatorSource::FromOptions(_) => "options creator",
        }
    }
}

impl<A: Actor> Clone for CreatorSource<A> {
    fn clone(&self) -> Self {
        match self {
            CreatorSource::FromType {
                type_name,
                construct,
            } => CreatorSource::FromType {
                type_name: *type_name,
                construct: construct.clone(),
            },
            CreatorSource::FromFactory(creator) => CreatorSource::FromFactory(creator.clone()),
            CreatorSource::FromOptions(creator) => CreatorSource::FromOptions(creator.clone()),
        }
    }
}

/// Trailing options for [`PropsResolver`].
pub struct PropsOptions<A: Actor> {
    pub creator: Option<Creator<A>>,
    pub dispatcher: Option<String>,
    pub router: Option<RouterConfig>,
}

impl<A: Actor> Default for PropsOptions<A> {
    fn default() -> Self {
        Self {
            creator: None,
            dispatcher: None,
            router: None,
        }
    }
}

impl<A: Actor> PropsOptions<A> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_creator<F>(mut self, creator: F) -> Self
    where
        F: Fn() -> Result<A, ActorProcessingErr> + Send + Sync + 'static,
    {
        self.creator = Some(Arc::new(creator));
        self
    }

    pub fn with_dispatcher(mut self, dispatcher: impl Into<String>) -> Self {
        self.dispatcher = Some(dispatcher.into());
        self
    }

    pub fn with_router(mut self, router: RouterConfig) -> Self {
        self.router = Some(router);
        self
    }
}

/// Resolves props from the creator candidates a caller supplied.
///
/// Precedence, first match wins: the positional source, then the options'
/// `creator`, then the block.
pub struct PropsResolver<A: Actor> {
    positional: Option<CreatorSource<A>>,
    options: Option<PropsOptions<A>>,
    block: Option<Creator<A>>,
}

impl<A: Actor> Default for PropsResolver<A> {
    fn default() -> Self {
        Self {
            positional: None,
            options: None,
            block: None,
        }
    }
}

impl<A: Actor> PropsResolver<A> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn positional(mut self, source: CreatorSource<A>) -> Self {
        self.positional = Some(source);
        self
    }

    pub fn options(mut self, options: PropsOptions<A>) -> Self {
        self.options = Some(options);
        self
    }

    pub fn block<F>(mut self, block: F) -> Self
    where
        F: Fn() -> Result<A, ActorProcessingErr> + Send + Sync + 'static,
    {
        self.block = Some(Arc::new(block));
        self
    }

    pub fn resolve(self) -> ActorResult<Props<A>> {
        let PropsOptions {
            creator: option_creator,
            dispatcher,
            router,
        } = self.options.unwrap_or_default();

        let source = self
            .positional
            .or_else(|| option_creator.map(CreatorSource::FromOptions))
            .or_else(|| self.block.map(CreatorSource::FromFactory))
            .ok_or_else(|| ActorError::Configuration("no creator specified".into()))?;

        let props = Props {
            source,
            router: None,
            dispatcher,
        };
        match router {
            Some(router) => props.with_router(router),
            None => Ok(props),
        }
    }
}

/// Immutable recipe for creating an actor.
///
/// The creator runs once per instantiation: at spawn and again on every
/// restart, each time producing an independent instance. Cloning props shares
/// the creator, never an instance.
pub struct Props<A: Actor> {
    source: CreatorSource<A>,
    pub(crate) router: Option<RouterConfig>,
    dispatcher: Option<String>,
}

impl<A: Actor> Props<A> {
    pub fn new(source: CreatorSource<A>) -> Self {
        Self {
            source,
            router: None,
            dispatcher: None,
        }
    }

    /// Props creating `A::default()`.
    pub fn of() -> Self
    where
        A: Default,
    {
        Self::new(CreatorSource::of_type())
    }

    /// Props calling `A::construct` with a clone of `args` on every instantiation.
    pub fn with_args(args: A::Args) -> Self
    where
        A: Construct,
    {
        Self::new(CreatorSource::with_args(args))
    }

    /// Props from a factory closure.
    pub fn create<F>(factory: F) -> Self
    where
        F: Fn() -> Result<A, ActorProcessingErr> + Send + Sync + 'static,
    {
        Self::new(CreatorSource::factory(factory))
    }

    /// Props from an options map; fails without a `creator`.
    pub fn from_options(options: PropsOptions<A>) -> ActorResult<Self> {
        PropsResolver::new().options(options).resolve()
    }

    /// New props with a dispatcher override. The original is unchanged.
    pub fn with_dispatcher(&self, dispatcher: impl Into<String>) -> Self {
        Self {
            dispatcher: Some(dispatcher.into()),
            ..self.clone()
        }
    }

    pub fn source(&self) -> &CreatorSource<A> {
        &self.source
    }

    pub fn router(&self) -> Option<&RouterConfig> {
        self.router.as_ref()
    }

    pub fn dispatcher(&self) -> Option<&str> {
        self.dispatcher.as_deref()
    }

    /// Run the creator once.
    pub fn instantiate(&self) -> Result<A, ActorProcessingErr> {
        (self.source.creator())()
    }

    /// The same props without a router, used for routees.
    pub(crate) fn without_router(&self) -> Self {
        Self {
            router: None,
            ..self.clone()
        }
    }
}

impl<A: Actor> Clone for Props<A> {
    fn clone(&self) -> Self {
        Self {
            source: self.source.clone(),
            router: self.router.clone(),
            dispatcher: self.dispatcher.clone(),
        }
    }
}

impl<A: Actor> std::fmt::Debug for Props<A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Props")
            .field("creator", &self.source.describe())
            .field("router", &self.router)
            .field("dispatcher", &self.dispatcher)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    #[derive(Default)]
    struct Counter {
        seen: usize,
    }

    impl Actor for Counter {
        type Msg = usize;

        async fn receive(
            &mut self,
            _ctx: &crate::ActorContext,
            message: usize,
        ) -> Result<(), ActorProcessingErr> {
            self.seen += message;
            Ok(())
        }
    }

    impl Construct for Counter {
        type Args = usize;

        fn construct(start: usize) -> Result<Self, ActorProcessingErr> {
            Ok(Counter { seen: start })
        }
    }

    #[test]
    fn positional_source_wins() -> ActorResult<()> {
        let props = PropsResolver::<Counter>::new()
            .positional(CreatorSource::with_args(5))
            .options(PropsOptions::new().with_creator(|| Ok(Counter { seen: 6 })))
            .block(|| Ok(Counter { seen: 7 }))
            .resolve()?;
        assert_eq!(props.instantiate().map(|c| c.seen).ok(), Some(5));
        Ok(())
    }

    #[test]
    fn options_creator_beats_block() -> ActorResult<()> {
        let props = PropsResolver::<Counter>::new()
            .options(PropsOptions::new().with_creator(|| Ok(Counter { seen: 6 })))
            .block(|| Ok(Counter { seen: 7 }))
            .resolve()?;
        assert_eq!(props.instantiate().map(|c| c.seen).ok(), Some(6));
        assert!(matches!(props.source(), CreatorSource::FromOptions(_)));
        Ok(())
    }

    #[test]
    fn block_is_last_resort() -> ActorResult<()> {
        let props = PropsResolver::<Counter>::new()
            .block(|| Ok(Counter { seen: 7 }))
            .resolve()?;
        assert_eq!(props.instantiate().map(|c| c.seen).ok(), Some(7));
        Ok(())
    }

    #[test]
    fn missing_creator_is_a_configuration_error() {
        let result = PropsResolver::<Counter>::new()
            .options(PropsOptions::new().with_dispatcher("pinned"))
            .resolve();
        assert!(matches!(result, Err(ActorError::Configuration(_))));
    }

    #[test]
    fn every_instantiation_is_independent() -> Result<(), ActorProcessingErr> {
        let calls = Arc::new(AtomicUsize::new(0));
        let counted = calls.clone();
        let props = Props::create(move || {
            counted.fetch_add(1, Ordering::SeqCst);
            Ok(Counter::default())
        });

        let mut first = props.instantiate()?;
        first.seen = 42;
        let second = props.instantiate()?;

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(second.seen, 0);
        Ok(())
    }

    #[test]
    fn type_props_reuse_constructor_args() -> Result<(), ActorProcessingErr> {
        let props = Props::<Counter>::with_args(3);
        assert_eq!(props.instantiate()?.seen, 3);
        assert_eq!(props.instantiate()?.seen, 3);
        assert_eq!(Props::<Counter>::of().instantiate()?.seen, 0);
        Ok(())
    }

    #[test]
    fn dispatcher_override_leaves_original_untouched() {
        let props = Props::<Counter>::of();
        let pinned = props.with_dispatcher("pinned");
        assert_eq!(props.dispatcher(), None);
        assert_eq!(pinned.dispatcher(), Some("pinned"));
    }

    #[test]
    fn options_router_is_validated() {
        let result = Props::from_options(
            PropsOptions::<Counter>::new()
                .with_creator(|| Ok(Counter::default()))
                .with_router(RouterConfig::round_robin(0)),
        );
        assert!(matches!(result, Err(ActorError::Configuration(_))));
    }
}
