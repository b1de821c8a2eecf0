use crate::error::{GlanceError, Result};
use crate::glance_error;
use crate::platform::{PlatformBackend, Rect, ThumbnailBinding, WindowHandle};
use std::sync::Arc;
use tracing::{debug, warn};

/// A source window mirrored into a destination surface.
///
/// Setters only record the desired state; `update` pushes all of it to the
/// compositor in one call. Must be driven from the UI thread.
pub struct LiveThumbnail {
    backend: Arc<dyn PlatformBackend>,
    destination: WindowHandle,
    source: WindowHandle,
    binding: Option<ThumbnailBinding>,
    rect: Rect,
    opacity: f32,
    visible: bool,
    invalid: bool,
}

impl LiveThumbnail {
    pub fn new(backend: Arc<dyn PlatformBackend>, destination: WindowHandle, source: WindowHandle) -> Self {
        Self {
            backend,
            destination,
            source,
            binding: None,
            rect: Rect::default(),
            opacity: 1.0,
            visible: true,
            invalid: false,
        }
    }

    pub fn register(&mut self) -> Result<()> {
        if self.binding.is_some() {
            return Err(glance_error!(
                invalid_state,
                "thumbnail {} -> {} is already registered",
                self.source,
                self.destination
            ));
        }
        let binding = self.backend.register_live_thumbnail(self.destination, self.source)?;
        debug!("Registered thumbnail {:?} for {}", binding.token, self.source);
        self.binding = Some(binding);
        self.invalid = false;
        Ok(())
    }

    pub fn move_to(&mut self, rect: Rect) {
        self.rect = rect;
    }

    /// Clamped to `[0.0, 1.0]`; NaN counts as opaque.
    pub fn set_opacity(&mut self, opacity: f32) {
        self.opacity = if opacity.is_nan() { 1.0 } else { opacity.clamp(0.0, 1.0) };
    }

    pub fn set_visible(&mut self, visible: bool) {
        self.visible = visible;
    }

    /// Push the desired state. A vanished source invalidates the binding
    /// instead of failing.
    pub fn update(&mut self) -> Result<()> {
        let opacity = self.opacity_byte();
        let (rect, visible) = (self.rect, self.visible);
        let binding = self
            .binding
            .as_mut()
            .ok_or_else(|| GlanceError::InvalidState("update on an unregistered thumbnail".to_string()))?;
        if self.invalid {
            return Ok(());
        }

        binding.destination_rect = rect;
        binding.opacity = opacity;
        binding.visible = visible;

        if let Err(e) = self.backend.update_live_thumbnail(binding) {
            if e.is_expected() {
                debug!("Thumbnail for {} is no longer valid: {}", self.source, e);
            } else {
                warn!("Thumbnail update for {} failed: {}", self.source, e);
            }
            self.invalid = true;
        }
        Ok(())
    }

    /// Release the compositor registration. No-op when not registered.
    pub fn unregister(&mut self) {
        let Some(binding) = self.binding.take() else {
            return;
        };
        if let Err(e) = self.backend.unregister_live_thumbnail(&binding) {
            debug!("Unregistering thumbnail {:?} failed: {}", binding.token, e);
        }
        self.invalid = false;
    }

    pub fn is_registered(&self) -> bool {
        self.binding.is_some()
    }

    /// Registered and not invalidated by a failed update.
    pub fn is_valid(&self) -> bool {
        self.binding.is_some() && !self.invalid
    }

    pub fn binding(&self) -> Option<&ThumbnailBinding> {
        self.binding.as_ref()
    }

    pub fn source(&self) -> WindowHandle {
        self.source
    }

    pub fn destination(&self) -> WindowHandle {
        self.destination
    }

    pub fn rect(&self) -> Rect {
        self.rect
    }

    pub fn opacity(&self) -> f32 {
        self.opacity
    }

    fn opacity_byte(&self) -> u8 {
        (self.opacity * 255.0).round() as u8
    }
}

impl Drop for LiveThumbnail {
    fn drop(&mut self) {
        self.unregister();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::dry_run::BackendCall;
    use crate::platform::{DryRunBackend, SurfaceSpec};

    fn setup() -> (Arc<DryRunBackend>, LiveThumbnail) {
        let backend = Arc::new(DryRunBackend::new());
        let source = backend.spawn_window(1, "EVE - Alice");
        let destination = backend
            .create_surface(&SurfaceSpec {
                title: "EVE - Alice".to_string(),
                x: 0,
                y: 0,
                width: 384,
                height: 216,
            })
            .unwrap();
        let thumbnail = LiveThumbnail::new(backend.clone(), destination, source);
        (backend, thumbnail)
    }

    #[test]
    fn test_register_twice_is_rejected() {
        let (backend, mut thumbnail) = setup();
        thumbnail.register().unwrap();

        let err = thumbnail.register().unwrap_err();
        assert!(matches!(err, GlanceError::InvalidState(_)));
        assert_eq!(backend.live_thumbnail_count(), 1);
    }

    #[test]
    fn test_unregister_when_unregistered_is_noop() {
        let (backend, mut thumbnail) = setup();
        thumbnail.unregister();
        thumbnail.unregister();
        assert!(!backend
            .calls()
            .iter()
            .any(|c| matches!(c, BackendCall::UnregisterThumbnail(_))));
    }

    #[test]
    fn test_reregister_gets_fresh_token() {
        let (_backend, mut thumbnail) = setup();
        thumbnail.register().unwrap();
        let first = thumbnail.binding().unwrap().token;
        thumbnail.unregister();
        thumbnail.register().unwrap();
        assert_ne!(thumbnail.binding().unwrap().token, first);
    }

    #[test]
    fn test_opacity_is_clamped_before_backend_call() {
        let (backend, mut thumbnail) = setup();
        thumbnail.register().unwrap();
        let token = thumbnail.binding().unwrap().token;

        thumbnail.set_opacity(1.5);
        assert_eq!(thumbnail.opacity(), 1.0);
        thumbnail.update().unwrap();
        assert_eq!(backend.thumbnail(token).unwrap().opacity, 255);

        thumbnail.set_opacity(-0.2);
        assert_eq!(thumbnail.opacity(), 0.0);
        thumbnail.update().unwrap();
        assert_eq!(backend.thumbnail(token).unwrap().opacity, 0);
    }

    #[test]
    fn test_setters_only_take_effect_on_update() {
        let (backend, mut thumbnail) = setup();
        thumbnail.register().unwrap();
        let token = thumbnail.binding().unwrap().token;
        backend.clear_calls();

        let rect = Rect::from_origin_size(0, 0, 384, 216);
        thumbnail.move_to(rect);
        thumbnail.set_opacity(0.5);
        thumbnail.set_visible(true);
        assert!(backend.calls().is_empty());

        thumbnail.update().unwrap();
        let stored = backend.thumbnail(token).unwrap();
        assert_eq!(stored.destination_rect, rect);
        assert_eq!(stored.opacity, 128);
        assert!(stored.visible);
        assert_eq!(backend.calls().len(), 1);
    }

    #[test]
    fn test_vanished_source_invalidates_binding() {
        let (backend, mut thumbnail) = setup();
        thumbnail.register().unwrap();
        backend.close_window(thumbnail.source());

        assert!(thumbnail.update().is_ok());
        assert!(thumbnail.is_registered());
        assert!(!thumbnail.is_valid());
    }

    #[test]
    fn test_update_requires_registration() {
        let (_backend, mut thumbnail) = setup();
        assert!(matches!(thumbnail.update(), Err(GlanceError::InvalidState(_))));
    }

    #[test]
    fn test_drop_unregisters() {
        let (backend, mut thumbnail) = setup();
        thumbnail.register().unwrap();
        assert_eq!(backend.live_thumbnail_count(), 1);
        drop(thumbnail);
        assert_eq!(backend.live_thumbnail_count(), 0);
    }
}
