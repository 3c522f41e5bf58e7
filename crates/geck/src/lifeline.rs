use std::{fmt, sync::Arc};

use crate::error::StillReferenced;

/// Liveness token owned by an object that others depend on.
///
/// Dependents keep a [`Tether`] for as long as they refer to the owner.
/// The owner may only be released once every tether is gone.
pub struct Lifeline {
    name: &'static str,
    token: Option<Arc<&'static str>>,
}

/// Held by an object that must be destroyed before its owner.
pub struct Tether {
    token: Arc<&'static str>,
}

impl fmt::Debug for Lifeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Lifeline")
            .field("name", &self.name)
            .field("released", &self.is_released())
            .field("dependents", &self.dependents())
            .finish()
    }
}

impl fmt::Debug for Tether {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Tether({})", self.token)
    }
}

impl Lifeline {
    pub fn new(name: &'static str) -> Self {
        Lifeline {
            name,
            token: Some(Arc::new(name)),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Returns a new tether, or `None` once the lifeline was released.
    pub fn tether(&self) -> Option<Tether> {
        let token = self.token.as_ref()?;
        Some(Tether {
            token: token.clone(),
        })
    }

    /// Number of tethers currently alive.
    pub fn dependents(&self) -> usize {
        self.token
            .as_ref()
            .map_or(0, |token| Arc::strong_count(token) - 1)
    }

    pub fn is_released(&self) -> bool {
        self.token.is_none()
    }

    /// Releases the lifeline.
    ///
    /// Fails without releasing while any tether is alive.
    /// Releasing twice is a no-op.
    pub fn release(&mut self) -> Result<(), StillReferenced> {
        let dependents = self.dependents();
        if dependents > 0 {
            return Err(StillReferenced {
                owner: self.name,
                dependents,
            });
        }
        self.token = None;
        Ok(())
    }
}

impl Tether {
    /// Name of the owner this tether keeps alive.
    pub fn owner(&self) -> &'static str {
        *self.token
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn release_without_dependents() {
        let mut lifeline = Lifeline::new("device");
        assert_eq!(lifeline.dependents(), 0);
        lifeline.release().unwrap();
        assert!(lifeline.is_released());
        lifeline.release().unwrap();
        assert!(lifeline.tether().is_none());
    }

    #[test]
    fn live_tether_blocks_release() {
        let mut device = Lifeline::new("device");
        let swapchain = device.tether().unwrap();
        assert_eq!(swapchain.owner(), "device");
        assert_eq!(device.dependents(), 1);

        let err = device.release().unwrap_err();
        assert_eq!(err.owner, "device");
        assert_eq!(err.dependents, 1);
        assert!(!device.is_released());

        drop(swapchain);
        device.release().unwrap();
    }

    /// Mimics the teardown sequence: every dependent must go
    /// before the owner, otherwise the owner refuses.
    #[test]
    fn dependents_must_be_destroyed_first() {
        let mut device = Lifeline::new("device");
        let mut surface = Lifeline::new("surface");

        let surface_on_device = device.tether().unwrap();
        let chain_on_device = device.tether().unwrap();
        let chain_on_surface = surface.tether().unwrap();
        assert_eq!(device.dependents(), 2);

        assert!(surface.release().is_err());
        assert!(device.release().is_err());

        // Swap chain goes first.
        drop(chain_on_device);
        drop(chain_on_surface);
        assert!(device.release().is_err());

        // Then the surface.
        surface.release().unwrap();
        drop(surface_on_device);

        device.release().unwrap();
    }
}
