//! Controller lifecycle contract and the per-type action table.
//!
//! A controller is created fresh for every dispatch. The dispatcher drives it
//! through `init`, `prepare`, one action and `finish`:
//!
//! ```no_run
//! use keystone_core::{Actions, Args, Controller, Error};
//!
//! #[derive(Default)]
//! struct UserController {
//!     tenant: Option<String>,
//! }
//!
//! impl UserController {
//!     fn show(&mut self, args: &mut Args) -> Result<String, Error> {
//!         let id: i64 = args.get("id")?;
//!         Ok(format!("user {} of {:?}", id, self.tenant))
//!     }
//! }
//!
//! impl Controller for UserController {
//!     fn actions(actions: &mut Actions<Self>) {
//!         actions.action("show", Self::show);
//!     }
//! }
//! ```

use crate::app::AppHandle;
use crate::binder::Args;
use crate::context::ContextHandle;
use crate::reply::{IntoReply, Reply};
use crate::Error;
use std::collections::HashMap;
use std::sync::Arc;

/// Lifecycle contract of every dispatch target.
pub trait Controller: Default + Send + 'static {
    /// Called first, with the live request and the route identity.
    fn init(
        &mut self,
        _ctx: ContextHandle,
        _controller: &str,
        _action: &str,
        _app: &AppHandle,
    ) {
    }

    /// Called after `init`. An error skips binding and the action.
    fn prepare(&mut self) -> Result<(), Error> {
        Ok(())
    }

    /// Called exactly once per dispatch, whatever happened before.
    fn finish(&mut self) {}

    /// Declare the actions of this type.
    fn actions(actions: &mut Actions<Self>);
}

type ActionFn<C> = Arc<dyn Fn(&mut C, &mut Args) -> Result<Reply, Error> + Send + Sync>;

/// Name-indexed action table built once per controller type.
pub struct Actions<C> {
    table: HashMap<String, ActionFn<C>>,
}

impl<C: Controller> Actions<C> {
    pub(crate) fn collect() -> Self {
        let mut actions = Self {
            table: HashMap::new(),
        };
        C::actions(&mut actions);
        actions
    }

    /// Register an action. A later registration under the same name wins.
    pub fn action<F, R>(&mut self, name: &str, f: F) -> &mut Self
    where
        F: Fn(&mut C, &mut Args) -> R + Send + Sync + 'static,
        R: IntoReply,
    {
        self.table.insert(
            name.to_string(),
            Arc::new(move |controller: &mut C, args: &mut Args| f(controller, args).into_reply()),
        );
        self
    }

    pub fn contains(&self, name: &str) -> bool {
        self.table.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.table.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }
}

/// A controller instance behind a type-erased interface.
pub(crate) trait LiveController: Send {
    fn init(&mut self, ctx: ContextHandle, controller: &str, action: &str, app: &AppHandle);
    fn prepare(&mut self) -> Result<(), Error>;
    fn invoke(&mut self, action: &str, args: &mut Args) -> Result<Reply, Error>;
    fn finish(&mut self);
}

struct Live<C: Controller> {
    controller: C,
    actions: Arc<Actions<C>>,
}

impl<C: Controller> LiveController for Live<C> {
    fn init(&mut self, ctx: ContextHandle, controller: &str, action: &str, app: &AppHandle) {
        self.controller.init(ctx, controller, action, app);
    }

    fn prepare(&mut self) -> Result<(), Error> {
        self.controller.prepare()
    }

    fn invoke(&mut self, action: &str, args: &mut Args) -> Result<Reply, Error> {
        let Some(f) = self.actions.table.get(action) else {
            return Err(Error::Invocation(format!(
                "{} has no action named '{}'",
                std::any::type_name::<C>(),
                action
            )));
        };
        f(&mut self.controller, args)
    }

    fn finish(&mut self) {
        self.controller.finish();
    }
}

/// Factory for fresh instances of one mounted controller type.
pub(crate) trait ControllerSlot: Send + Sync {
    fn create(&self) -> Box<dyn LiveController>;
    fn has_action(&self, name: &str) -> bool;
}

pub(crate) struct Slot<C: Controller> {
    actions: Arc<Actions<C>>,
}

impl<C: Controller> Slot<C> {
    pub(crate) fn new() -> Self {
        Self {
            actions: Arc::new(Actions::collect()),
        }
    }
}

impl<C: Controller> ControllerSlot for Slot<C> {
    fn create(&self) -> Box<dyn LiveController> {
        Box::new(Live {
            controller: C::default(),
            actions: self.actions.clone(),
        })
    }

    fn has_action(&self, name: &str) -> bool {
        self.actions.contains(name)
    }
}
