use crate::bo::BoBackend;
use crate::bo::memory::BoView;
use crate::config::Dri2Options;
use crate::dri2::buffer::{Attachment, Dri2Buffer, PublishOutcome};
use crate::dri2::manager::Dri2;
use crate::foundation::core::{Region, SurfaceId};
use crate::foundation::error::{Dri2Error, Dri2Result};
use crate::hooks::{HookChain, HookToken};
use crate::host::{ImageRequest, ScreenHost};
use crate::overlay::plane::Display;

/// State every screen hook sees: the host and, once enabled, the buffer manager.
pub struct ScreenContext<H> {
    /// The display server.
    pub host: H,
    dri2: Option<Dri2>,
}

struct ScreenHooks<H> {
    destroy_window: HookChain<ScreenContext<H>, SurfaceId, bool>,
    destroy_pixmap: HookChain<ScreenContext<H>, SurfaceId, bool>,
    post_validate_tree: HookChain<ScreenContext<H>, Option<SurfaceId>, ()>,
    get_image: HookChain<ScreenContext<H>, ImageRequest, Vec<u8>>,
    enable_hw_cursor: HookChain<ScreenContext<H>, (), ()>,
    disable_hw_cursor: HookChain<ScreenContext<H>, (), ()>,
}

#[derive(Default)]
struct Installed {
    destroy_window: Option<HookToken>,
    destroy_pixmap: Option<HookToken>,
    post_validate_tree: Option<HookToken>,
    get_image: Option<HookToken>,
    enable_hw_cursor: Option<HookToken>,
    disable_hw_cursor: Option<HookToken>,
}

/// A host screen whose lifecycle entry points run through hook chains.
///
/// Enabling buffer exchange wraps the window/pixmap destructors, tree validation, screen readback
/// and the cursor switches so buffer bookkeeping and the overlay follow host events. Disabling it
/// unwraps them in reverse order.
pub struct Screen<H: ScreenHost + 'static> {
    ctx: ScreenContext<H>,
    hooks: ScreenHooks<H>,
    installed: Installed,
}

impl<H: ScreenHost + 'static> Screen<H> {
    /// Wrap `host` with only its base handlers installed.
    pub fn new(host: H) -> Self {
        let hooks = ScreenHooks {
            destroy_window: HookChain::new(
                "DestroyWindow",
                |ctx: &mut ScreenContext<H>, id: &SurfaceId| ctx.host.destroy_window(*id),
            ),
            destroy_pixmap: HookChain::new(
                "DestroyPixmap",
                |ctx: &mut ScreenContext<H>, id: &SurfaceId| ctx.host.destroy_pixmap(*id),
            ),
            post_validate_tree: HookChain::new(
                "PostValidateTree",
                |ctx: &mut ScreenContext<H>, changed: &Option<SurfaceId>| {
                    ctx.host.post_validate_tree(*changed)
                },
            ),
            get_image: HookChain::new(
                "GetImage",
                |ctx: &mut ScreenContext<H>, req: &ImageRequest| ctx.host.get_image(req),
            ),
            enable_hw_cursor: HookChain::new(
                "EnableHWCursor",
                |ctx: &mut ScreenContext<H>, _: &()| ctx.host.enable_hw_cursor(),
            ),
            disable_hw_cursor: HookChain::new(
                "DisableHWCursor",
                |ctx: &mut ScreenContext<H>, _: &()| ctx.host.disable_hw_cursor(),
            ),
        };
        Self {
            ctx: ScreenContext { host, dri2: None },
            hooks,
            installed: Installed::default(),
        }
    }

    /// The host.
    pub fn host(&self) -> &H {
        &self.ctx.host
    }

    /// The host, mutably. Tree changes are seen at the next [`Screen::post_validate_tree`].
    pub fn host_mut(&mut self) -> &mut H {
        &mut self.ctx.host
    }

    /// The buffer manager, when enabled.
    pub fn dri2(&self) -> Option<&Dri2> {
        self.ctx.dri2.as_ref()
    }

    /// `true` while buffer exchange is enabled.
    pub fn dri2_enabled(&self) -> bool {
        self.ctx.dri2.is_some()
    }

    /// Start buffer exchange on this screen and install its hooks.
    pub fn enable_dri2(
        &mut self,
        opts: Dri2Options,
        backend: Box<dyn BoBackend>,
        display: Option<Display>,
    ) -> Dri2Result<()> {
        if !opts.enabled {
            tracing::info!("buffer exchange disabled in configuration");
            return Err(Dri2Error::config("buffer exchange is disabled"));
        }
        if self.ctx.dri2.is_some() {
            return Err(Dri2Error::protocol("buffer exchange is already enabled"));
        }
        let use_exa = opts.use_exa;
        self.ctx.dri2 = Some(Dri2::new(opts, backend, display));

        let h = &mut self.hooks;
        let i = &mut self.installed;
        i.destroy_window = Some(h.destroy_window.install(|ctx, id, next| {
            if let Some(dri2) = ctx.dri2.as_mut() {
                dri2.destroy_window(&mut ctx.host, *id);
            }
            next.run(ctx, id)
        }));
        if !use_exa {
            i.post_validate_tree = Some(h.post_validate_tree.install(|ctx, changed, next| {
                next.run(ctx, changed);
                if let Some(dri2) = ctx.dri2.as_mut() {
                    dri2.update_overlay(&mut ctx.host);
                }
            }));
            i.get_image = Some(h.get_image.install(|ctx, req, next| {
                if let Some(dri2) = ctx.dri2.as_mut() {
                    dri2.prepare_readback(&mut ctx.host);
                }
                next.run(ctx, req)
            }));
            i.destroy_pixmap = Some(h.destroy_pixmap.install(|ctx, id, next| {
                if let Some(dri2) = ctx.dri2.as_mut() {
                    dri2.destroy_pixmap(&mut ctx.host, *id);
                }
                next.run(ctx, id)
            }));
        }
        i.enable_hw_cursor = Some(h.enable_hw_cursor.install(|ctx, ev, next| {
            next.run(ctx, ev);
            if let Some(dri2) = ctx.dri2.as_mut() {
                dri2.set_hw_cursor(&mut ctx.host, true);
            }
        }));
        i.disable_hw_cursor = Some(h.disable_hw_cursor.install(|ctx, ev, next| {
            next.run(ctx, ev);
            if let Some(dri2) = ctx.dri2.as_mut() {
                dri2.set_hw_cursor(&mut ctx.host, false);
            }
        }));
        tracing::info!(use_exa, "buffer exchange enabled");
        Ok(())
    }

    /// Remove the hooks in reverse order and release every resource of the buffer manager.
    /// Returns the backend, `None` when buffer exchange was not enabled.
    pub fn disable_dri2(&mut self) -> Dri2Result<Option<Box<dyn BoBackend>>> {
        let Some(dri2) = self.ctx.dri2.take() else {
            return Ok(None);
        };
        let h = &mut self.hooks;
        let i = std::mem::take(&mut self.installed);
        if let Some(t) = i.disable_hw_cursor {
            h.disable_hw_cursor.uninstall(t)?;
        }
        if let Some(t) = i.enable_hw_cursor {
            h.enable_hw_cursor.uninstall(t)?;
        }
        if let Some(t) = i.destroy_pixmap {
            h.destroy_pixmap.uninstall(t)?;
        }
        if let Some(t) = i.get_image {
            h.get_image.uninstall(t)?;
        }
        if let Some(t) = i.post_validate_tree {
            h.post_validate_tree.uninstall(t)?;
        }
        if let Some(t) = i.destroy_window {
            h.destroy_window.uninstall(t)?;
        }
        let backend = dri2.close(&mut self.ctx.host);
        tracing::info!("buffer exchange disabled");
        Ok(Some(backend))
    }

    /// Destroy a window through the hook chain.
    pub fn destroy_window(&mut self, id: SurfaceId) -> bool {
        self.hooks.destroy_window.call(&mut self.ctx, &id)
    }

    /// Destroy a pixmap through the hook chain.
    pub fn destroy_pixmap(&mut self, id: SurfaceId) -> bool {
        self.hooks.destroy_pixmap.call(&mut self.ctx, &id)
    }

    /// Notify that the window tree was revalidated.
    pub fn post_validate_tree(&mut self, changed: Option<SurfaceId>) {
        self.hooks.post_validate_tree.call(&mut self.ctx, &changed);
    }

    /// Read back screen content through the hook chain.
    pub fn get_image(&mut self, request: ImageRequest) -> Vec<u8> {
        self.hooks.get_image.call(&mut self.ctx, &request)
    }

    /// Switch to the hardware cursor.
    pub fn enable_hw_cursor(&mut self) {
        self.hooks.enable_hw_cursor.call(&mut self.ctx, &());
    }

    /// Switch to the software cursor.
    pub fn disable_hw_cursor(&mut self) {
        self.hooks.disable_hw_cursor.call(&mut self.ctx, &());
    }

    fn parts(&mut self) -> Dri2Result<(&mut Dri2, &mut H)> {
        match self.ctx.dri2.as_mut() {
            Some(dri2) => Ok((dri2, &mut self.ctx.host)),
            None => Err(Dri2Error::protocol("buffer exchange is not enabled")),
        }
    }

    /// See [`Dri2::create_buffer`].
    pub fn create_buffer(
        &mut self,
        surface: SurfaceId,
        attachment: Attachment,
        format: u32,
    ) -> Dri2Result<Dri2Buffer> {
        let (dri2, host) = self.parts()?;
        dri2.create_buffer(host, surface, attachment, format)
    }

    /// See [`Dri2::destroy_buffer`].
    pub fn destroy_buffer(&mut self, buffer: Dri2Buffer) -> Dri2Result<()> {
        let (dri2, _) = self.parts()?;
        dri2.destroy_buffer(buffer)
    }

    /// See [`Dri2::copy_region`].
    pub fn copy_region(
        &mut self,
        surface: SurfaceId,
        region: &Region,
        dst: &Dri2Buffer,
        src: &Dri2Buffer,
    ) -> Dri2Result<PublishOutcome> {
        let (dri2, host) = self.parts()?;
        Ok(dri2.copy_region(host, surface, region, dst, src))
    }

    /// CPU view of a client buffer, as the rendering client would map it.
    pub fn map_buffer(&self, buffer: &Dri2Buffer) -> Option<BoView> {
        self.ctx.dri2.as_ref()?.map_buffer(buffer)
    }
}

#[cfg(test)]
#[path = "../tests/unit/screen.rs"]
mod tests;
