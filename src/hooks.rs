use crate::foundation::error::{Dri2Error, Dri2Result};

type Base<C, E, R> = Box<dyn FnMut(&mut C, &E) -> R>;

/// A handler wrapped around whatever was installed before it. It decides whether and when to
/// continue into the previous handler through [`Next::run`].
pub type Hook<C, E, R> = Box<dyn FnMut(&mut C, &E, Next<'_, C, E, R>) -> R>;

/// Identifies one installed hook.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HookToken {
    chain: &'static str,
    id: u64,
}

/// Continuation into the handlers installed below the running one.
pub struct Next<'a, C, E, R> {
    hooks: &'a mut [(HookToken, Hook<C, E, R>)],
    base: &'a mut Base<C, E, R>,
}

impl<C, E, R> Next<'_, C, E, R> {
    /// Run the previously installed handler.
    pub fn run(self, ctx: &mut C, event: &E) -> R {
        match self.hooks.split_last_mut() {
            Some(((_, hook), rest)) => hook(
                ctx,
                event,
                Next {
                    hooks: rest,
                    base: self.base,
                },
            ),
            None => (self.base)(ctx, event),
        }
    }
}

/// One host entry point with a stack of wrappers around its base handler.
///
/// The most recently installed hook runs first. Hooks must be removed in the reverse order of
/// installation, so a wrapper never outlives the handler it captured.
pub struct HookChain<C, E, R> {
    name: &'static str,
    base: Base<C, E, R>,
    hooks: Vec<(HookToken, Hook<C, E, R>)>,
    next_id: u64,
}

impl<C, E, R> HookChain<C, E, R> {
    /// A chain that runs only `base`.
    pub fn new(name: &'static str, base: impl FnMut(&mut C, &E) -> R + 'static) -> Self {
        Self {
            name,
            base: Box::new(base),
            hooks: Vec::new(),
            next_id: 0,
        }
    }

    /// Entry point name, for diagnostics.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Number of installed hooks.
    pub fn len(&self) -> usize {
        self.hooks.len()
    }

    /// `true` when only the base handler is left.
    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }

    /// Wrap the current handler.
    pub fn install(
        &mut self,
        hook: impl FnMut(&mut C, &E, Next<'_, C, E, R>) -> R + 'static,
    ) -> HookToken {
        self.next_id += 1;
        let token = HookToken {
            chain: self.name,
            id: self.next_id,
        };
        self.hooks.push((token, Box::new(hook)));
        tracing::debug!(
            chain = self.name,
            depth = self.hooks.len(),
            "hook installed"
        );
        token
    }

    /// Remove the most recently installed hook, which must be `token`.
    pub fn uninstall(&mut self, token: HookToken) -> Dri2Result<()> {
        match self.hooks.last() {
            Some((top, _)) if *top == token => {
                self.hooks.pop();
                tracing::debug!(chain = self.name, depth = self.hooks.len(), "hook removed");
                Ok(())
            }
            Some(_) if self.hooks.iter().any(|(t, _)| *t == token) => Err(Dri2Error::hook(format!(
                "{}: hook {} removed while newer hooks are installed",
                self.name, token.id
            ))),
            _ => Err(Dri2Error::hook(format!(
                "{}: hook {} from chain '{}' is not installed",
                self.name, token.id, token.chain
            ))),
        }
    }

    /// Dispatch an event through every hook and finally the base handler.
    pub fn call(&mut self, ctx: &mut C, event: &E) -> R {
        Next {
            hooks: &mut self.hooks,
            base: &mut self.base,
        }
        .run(ctx, event)
    }
}

#[cfg(test)]
#[path = "../tests/unit/hooks.rs"]
mod tests;
