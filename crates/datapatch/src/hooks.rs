//! Global hook dispatch around full run and rollback cycles.
//!
//! Hooks are injected at construction instead of resolved by configured
//! name: each of the four slots is an optional boxed callable, and an
//! absent slot is silently skipped.

/// A global hook callable.
pub type Hook = Box<dyn Fn()>;

/// The four optional global hook slots bracketing run/rollback cycles.
#[derive(Default)]
pub struct Hooks {
    pub up_before: Option<Hook>,
    pub up_after: Option<Hook>,
    pub down_before: Option<Hook>,
    pub down_after: Option<Hook>,
}

impl Hooks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_up_before(mut self, hook: impl Fn() + 'static) -> Self {
        self.up_before = Some(Box::new(hook));
        self
    }

    pub fn on_up_after(mut self, hook: impl Fn() + 'static) -> Self {
        self.up_after = Some(Box::new(hook));
        self
    }

    pub fn on_down_before(mut self, hook: impl Fn() + 'static) -> Self {
        self.down_before = Some(Box::new(hook));
        self
    }

    pub fn on_down_after(mut self, hook: impl Fn() + 'static) -> Self {
        self.down_after = Some(Box::new(hook));
        self
    }

    pub(crate) fn fire_up_before(&self, log: &mut dyn FnMut(&str)) {
        fire(&self.up_before, "up.before", log);
    }

    pub(crate) fn fire_up_after(&self, log: &mut dyn FnMut(&str)) {
        fire(&self.up_after, "up.after", log);
    }

    pub(crate) fn fire_down_before(&self, log: &mut dyn FnMut(&str)) {
        fire(&self.down_before, "down.before", log);
    }

    pub(crate) fn fire_down_after(&self, log: &mut dyn FnMut(&str)) {
        fire(&self.down_after, "down.after", log);
    }
}

fn fire(hook: &Option<Hook>, slot: &str, log: &mut dyn FnMut(&str)) {
    if let Some(hook) = hook {
        log(&format!("   - Executing global hook: {slot}"));
        tracing::debug!(hook = slot, "executing global hook");
        hook();
    }
}
