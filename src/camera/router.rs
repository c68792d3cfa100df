use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::Result;

use super::frame::{CameraState, Frame};

/// A consumer of captured frames.
///
/// Called on the capture thread with the router lock held, so
/// implementations must not call back into the router.
pub trait FrameHandler: Send + Sync {
    fn on_frame(&self, state: CameraState, frame: &Frame) -> Result<()>;
}

pub type SharedHandler = Arc<dyn FrameHandler>;

/// Single-slot dispatch point between the capture loop and its consumer.
///
/// The same lock guards both `swap` and `invoke`, so a swap is never
/// observed half-done by an in-flight frame, and once `swap` returns the
/// old handler will not be called again.
#[derive(Default)]
pub struct CallbackRouter {
    slot: Mutex<Option<SharedHandler>>,
}

impl CallbackRouter {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Option<SharedHandler>> {
        match self.slot.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Installs `handler` and hands back whatever was installed before.
    pub fn swap(&self, handler: Option<SharedHandler>) -> Option<SharedHandler> {
        let mut guard = self.lock();
        std::mem::replace(&mut *guard, handler)
    }

    pub fn set_callback(&self, handler: SharedHandler) {
        self.swap(Some(handler));
    }

    pub fn current(&self) -> Option<SharedHandler> {
        self.lock().clone()
    }

    pub fn is_registered(&self) -> bool {
        self.lock().is_some()
    }

    /// Runs the current handler, or does nothing when none is installed.
    pub fn invoke(&self, state: CameraState, frame: &Frame) -> Result<()> {
        let guard = self.lock();
        match guard.as_ref() {
            Some(handler) => handler.on_frame(state, frame),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use image::RgbImage;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Counting {
        calls: AtomicUsize,
    }

    impl FrameHandler for Counting {
        fn on_frame(&self, _state: CameraState, _frame: &Frame) -> Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct Failing;

    impl FrameHandler for Failing {
        fn on_frame(&self, _state: CameraState, _frame: &Frame) -> Result<()> {
            Err(anyhow!("boom"))
        }
    }

    fn frame() -> Frame {
        Frame::new(RgbImage::new(2, 2), 0)
    }

    #[test]
    fn invoke_without_handler_is_a_no_op() {
        let router = CallbackRouter::new();
        assert!(router.invoke(CameraState::Standby, &frame()).is_ok());
        assert!(!router.is_registered());
    }

    #[test]
    fn swap_returns_previous_handler() {
        let router = CallbackRouter::new();
        let first = Arc::new(Counting {
            calls: AtomicUsize::new(0),
        });
        let second = Arc::new(Counting {
            calls: AtomicUsize::new(0),
        });

        assert!(router.swap(Some(first.clone())).is_none());
        router.invoke(CameraState::Sampling, &frame()).unwrap();

        let previous = router.swap(Some(second.clone())).unwrap();
        let previous_ptr = Arc::as_ptr(&previous) as *const ();
        assert_eq!(previous_ptr, Arc::as_ptr(&first) as *const ());

        router.invoke(CameraState::Sampling, &frame()).unwrap();
        assert_eq!(first.calls.load(Ordering::SeqCst), 1);
        assert_eq!(second.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn handler_errors_reach_the_caller() {
        let router = CallbackRouter::new();
        router.set_callback(Arc::new(Failing));
        assert!(router.invoke(CameraState::Standby, &frame()).is_err());
    }
}
