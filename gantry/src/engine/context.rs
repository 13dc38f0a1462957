//! Ambient per-activation scope for procedure handlers.
//!
//! Handlers invoked deep inside the call chain can ask which client's request
//! is executing and which scene the host is in, without threading either
//! through every signature. The scope is set immediately before a
//! continuation (or stream invocation) runs and cleared on exit, including
//! suspension and error paths. Single-threaded "current activation" state,
//! not a thread-local pool.

use std::cell::RefCell;
use std::rc::Rc;

use crate::transport::RpcClient;

/// Host-defined scene label, e.g. `"flight"` or `"editor"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Scene(String);

impl Scene {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for Scene {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

struct ActiveCall {
    /// Absent during stream invocations, which run on behalf of the whole
    /// stream channel rather than a single request.
    client: Option<Rc<dyn RpcClient>>,
    scene: Option<Scene>,
}

thread_local! {
    static ACTIVE: RefCell<Option<ActiveCall>> = const { RefCell::new(None) };
}

/// RAII guard marking one invocation as the current activation.
///
/// Dropping the guard clears the scope, so every exit path (return,
/// suspension, or error) restores the inactive state.
pub struct CallScope {
    _not_send: core::marker::PhantomData<*const ()>,
}

impl CallScope {
    pub(crate) fn enter(client: Option<Rc<dyn RpcClient>>, scene: Option<Scene>) -> Self {
        ACTIVE.with(|active| {
            *active.borrow_mut() = Some(ActiveCall { client, scene });
        });
        Self {
            _not_send: core::marker::PhantomData,
        }
    }
}

impl Drop for CallScope {
    fn drop(&mut self) {
        ACTIVE.with(|active| {
            *active.borrow_mut() = None;
        });
    }
}

/// The client whose request is currently executing, if any.
#[must_use]
pub fn current_client() -> Option<Rc<dyn RpcClient>> {
    ACTIVE.with(|active| {
        active
            .borrow()
            .as_ref()
            .and_then(|call| call.client.clone())
    })
}

/// The host scene for the current activation, if any.
#[must_use]
pub fn current_scene() -> Option<Scene> {
    ACTIVE.with(|active| active.borrow().as_ref().and_then(|call| call.scene.clone()))
}
