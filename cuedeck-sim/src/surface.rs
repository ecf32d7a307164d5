//! Simulated playback surface with seeded latency and attach failures.

use std::time::Duration;

use async_trait::async_trait;
use cuedeck_core::config::SimulationConfig;
use cuedeck_core::playback::{PlaybackSurface, SurfaceAttachment, SurfaceError};
use parking_lot::Mutex;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use url::Url;

#[derive(Debug)]
struct SimulatedSurfaceState {
    rng: ChaCha8Rng,
    attached: Option<(u64, Url)>,
    next_slot: u64,
    history: Vec<Url>,
}

/// Single-slot playback surface driven by a deterministic RNG.
///
/// Holds at most one attachment, like a real output surface; attaching
/// while occupied fails with `SurfaceBusy`.
#[derive(Debug)]
pub struct SimulatedPlaybackSurface {
    state: Mutex<SimulatedSurfaceState>,
    latency: Duration,
    attach_failure_rate: f64,
}

impl SimulatedPlaybackSurface {
    pub fn new(config: &SimulationConfig) -> Self {
        // Offset so store and surface do not draw the same sequence.
        let seed = config
            .deterministic_seed
            .map(|seed| seed.wrapping_add(1))
            .unwrap_or_else(rand::random);

        Self {
            state: Mutex::new(SimulatedSurfaceState {
                rng: ChaCha8Rng::seed_from_u64(seed),
                attached: None,
                next_slot: 0,
                history: Vec::new(),
            }),
            latency: Duration::from_millis(config.surface_latency_ms),
            attach_failure_rate: config.attach_failure_rate.clamp(0.0, 1.0),
        }
    }

    /// Content currently attached.
    pub fn attached(&self) -> Option<Url> {
        self.state.lock().attached.as_ref().map(|(_, url)| url.clone())
    }

    /// Every URL that was successfully attached, in order.
    pub fn history(&self) -> Vec<Url> {
        self.state.lock().history.clone()
    }
}

#[async_trait]
impl PlaybackSurface for SimulatedPlaybackSurface {
    async fn attach(&self, content: &Url) -> Result<SurfaceAttachment, SurfaceError> {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        let mut state = self.state.lock();
        if state.attached.is_some() {
            return Err(SurfaceError::SurfaceBusy);
        }

        let roll: f64 = state.rng.random();
        if roll < self.attach_failure_rate {
            tracing::debug!(%content, "Simulated attach failure");
            return Err(SurfaceError::AttachFailed {
                reason: format!("simulated decoder failure for {content}"),
            });
        }

        let slot = state.next_slot;
        state.next_slot += 1;
        state.attached = Some((slot, content.clone()));
        state.history.push(content.clone());
        Ok(SurfaceAttachment::new(slot))
    }

    async fn detach(&self, attachment: SurfaceAttachment) -> Result<(), SurfaceError> {
        let mut state = self.state.lock();
        let occupied = state
            .attached
            .as_ref()
            .is_some_and(|(slot, _)| *slot == attachment.slot());
        if !occupied {
            return Err(SurfaceError::DetachFailed {
                reason: format!("slot {} is not attached", attachment.slot()),
            });
        }

        state.attached = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url(path: &str) -> Url {
        Url::parse(&format!("https://example.com/{path}")).unwrap()
    }

    #[tokio::test]
    async fn test_single_slot() {
        let surface = SimulatedPlaybackSurface::new(&SimulationConfig::deterministic_testing());

        let attachment = surface.attach(&url("a.swf")).await.unwrap();
        assert!(matches!(
            surface.attach(&url("b.swf")).await,
            Err(SurfaceError::SurfaceBusy)
        ));

        surface.detach(attachment).await.unwrap();
        assert!(surface.attached().is_none());
        surface.attach(&url("b.swf")).await.unwrap();
        assert_eq!(surface.history(), vec![url("a.swf"), url("b.swf")]);
    }

    #[tokio::test]
    async fn test_certain_attach_failure() {
        let config = SimulationConfig {
            attach_failure_rate: 1.0,
            ..SimulationConfig::deterministic_testing()
        };
        let surface = SimulatedPlaybackSurface::new(&config);

        let result = surface.attach(&url("a.swf")).await;
        assert!(matches!(result, Err(SurfaceError::AttachFailed { .. })));
        assert!(surface.attached().is_none());
    }
}
