use std::time::Duration;

use rand::distributions::Uniform;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tokio::time::sleep;
use tracing::debug;

use crate::config::HumanSimulationSection;

use super::error::{BrowserError, BrowserResult};
use super::page::BrowserPage;

/// Fixed step length of the slider drag simulation, in seconds.
const SLIDER_STEP_SECONDS: f64 = 0.2;
const SLIDER_ACCELERATION: f64 = 2.0;
const SLIDER_DECELERATION: f64 = -3.0;
const SLIDER_RELEASE_PAUSE_MS: [u32; 2] = [500, 1000];

/// Human timing primitives shared by every platform flow.
#[derive(Debug, Clone)]
pub struct AntiDetectionEngine {
    config: HumanSimulationSection,
    rng: ChaCha8Rng,
    last_point: Option<(f64, f64)>,
}

impl AntiDetectionEngine {
    pub fn new(config: HumanSimulationSection) -> Self {
        Self {
            config,
            rng: ChaCha8Rng::from_entropy(),
            last_point: None,
        }
    }

    /// Deterministic variant for tests.
    pub fn with_seed(config: HumanSimulationSection, seed: u64) -> Self {
        Self {
            config,
            rng: ChaCha8Rng::seed_from_u64(seed),
            last_point: None,
        }
    }

    pub fn config(&self) -> &HumanSimulationSection {
        &self.config
    }

    pub fn random_duration(&mut self, bounds: [u32; 2]) -> Duration {
        let (low, high) = (bounds[0].min(bounds[1]), bounds[0].max(bounds[1]));
        Duration::from_millis(self.rng.gen_range(low..=high) as u64)
    }

    /// Waits between two user-visible actions.
    pub async fn random_delay(&mut self) {
        let delay = self.random_duration(self.config.action_delay_ms);
        debug!(delay_ms = delay.as_millis() as u64, "action delay");
        sleep(delay).await;
    }

    pub async fn pause(&mut self, bounds: [u32; 2]) {
        let delay = self.random_duration(bounds);
        sleep(delay).await;
    }

    /// Eased pointer path from the last known position to `target`.
    pub fn plan_motion(&mut self, target: (f64, f64)) -> Vec<(f64, f64)> {
        let start = self.last_point.unwrap_or((0.0, 0.0));
        let [low, high] = self.config.pointer_steps;
        let steps = self.rng.gen_range(low.min(high)..=high.max(low)).max(1) as usize;
        let jitter = self.config.mouse_jitter_px as f64;
        let mut path = Vec::with_capacity(steps);
        for idx in 1..steps {
            let eased = ease_in_out_cubic(idx as f64 / steps as f64);
            path.push((
                start.0 + (target.0 - start.0) * eased + self.random_offset(jitter),
                start.1 + (target.1 - start.1) * eased + self.random_offset(jitter),
            ));
        }
        path.push(target);
        path
    }

    /// Wanders the pointer to a random on-screen spot.
    pub async fn move_pointer_randomly(&mut self, page: &mut dyn BrowserPage) -> BrowserResult<()> {
        let viewport = page.viewport();
        let [x_low, x_high] = self.config.pointer_x_range;
        let [y_low, y_high] = self.config.pointer_y_range;
        let x_high = x_high.min(viewport.width.saturating_sub(1)).max(x_low);
        let y_high = y_high.min(viewport.height.saturating_sub(1)).max(y_low);
        let target = (
            self.rng.gen_range(x_low..=x_high) as f64,
            self.rng.gen_range(y_low..=y_high) as f64,
        );
        self.execute_motion(page, target).await
    }

    /// Moves onto a random point inside the element. Returns false when the
    /// element has no box.
    pub async fn move_to(&mut self, page: &mut dyn BrowserPage, selector: &str) -> BrowserResult<bool> {
        let Some(bbox) = page.bounding_box(selector).await? else {
            return Ok(false);
        };
        let target = (
            bbox.x + self.rng.gen_range(0.3..0.7) * bbox.width,
            bbox.y + self.rng.gen_range(0.2..0.6) * bbox.height,
        );
        self.execute_motion(page, target).await?;
        Ok(true)
    }

    pub async fn click(&mut self, page: &mut dyn BrowserPage, selector: &str) -> BrowserResult<()> {
        if !self.move_to(page, selector).await? {
            return Err(BrowserError::ElementNotFound(selector.to_string()));
        }
        let hesitation = self.random_duration(self.config.click_hesitation_ms);
        sleep(hesitation).await;
        page.click(selector).await
    }

    /// Types one character at a time with a jittered pause after each.
    pub async fn type_text(
        &mut self,
        page: &mut dyn BrowserPage,
        selector: &str,
        text: &str,
        bounds: [u32; 2],
    ) -> BrowserResult<()> {
        page.click(selector).await?;
        for ch in text.chars() {
            page.type_char(selector, ch).await?;
            let delay = self.random_duration(bounds);
            sleep(delay).await;
        }
        Ok(())
    }

    pub async fn scroll(&mut self, page: &mut dyn BrowserPage) -> BrowserResult<()> {
        let [low, high] = self.config.scroll_px;
        let delta = self.rng.gen_range(low.min(high)..=high.max(low)) as f64;
        page.scroll_by(delta).await?;
        self.pause(self.config.action_delay_ms).await;
        Ok(())
    }

    /// Drags the slider handle by `distance` pixels along a human-like
    /// trajectory. Returns false when the handle is missing.
    pub async fn drag_slider(
        &mut self,
        page: &mut dyn BrowserPage,
        selector: &str,
        distance: f64,
    ) -> BrowserResult<bool> {
        let Some(bbox) = page.bounding_box(selector).await? else {
            return Ok(false);
        };
        let (start_x, start_y) = bbox.center();
        page.mouse_move(start_x, start_y).await?;
        page.mouse_down(start_x, start_y).await?;

        let track = slider_trajectory(distance);
        debug!(steps = track.len(), distance, "dragging slider");
        let mut x = start_x;
        for step in track {
            x += step;
            let y = start_y + self.random_offset(1.0);
            page.mouse_move(x, y).await?;
            let pause = self.random_duration(self.config.slider_step_pause_ms);
            sleep(pause).await;
        }

        self.pause(SLIDER_RELEASE_PAUSE_MS).await;
        page.mouse_up(x, start_y).await?;
        self.last_point = Some((x, start_y));
        Ok(true)
    }

    async fn execute_motion(
        &mut self,
        page: &mut dyn BrowserPage,
        target: (f64, f64),
    ) -> BrowserResult<()> {
        for (x, y) in self.plan_motion(target) {
            page.mouse_move(x, y).await?;
            let delay = self.random_duration([8, 24]);
            sleep(delay).await;
        }
        self.last_point = Some(target);
        Ok(())
    }

    fn random_offset(&mut self, max: f64) -> f64 {
        if max <= 0.0 {
            return 0.0;
        }
        self.rng.sample(Uniform::new_inclusive(-max, max))
    }
}

/// Incremental horizontal displacements for dragging a slider `distance`
/// pixels: constant acceleration up to four fifths of the way, constant
/// deceleration afterwards, velocity carried between fixed-length steps.
/// The final step is trimmed so the displacements sum to `distance`.
pub fn slider_trajectory(distance: f64) -> Vec<f64> {
    if !distance.is_finite() || distance <= 0.0 {
        return Vec::new();
    }
    let mid = distance * 4.0 / 5.0;
    let t = SLIDER_STEP_SECONDS;
    let mut current = 0.0;
    let mut velocity = 0.0;
    let mut track = Vec::new();

    while current < distance {
        let acceleration = if current < mid {
            SLIDER_ACCELERATION
        } else {
            SLIDER_DECELERATION
        };
        let v0 = velocity;
        velocity = v0 + acceleration * t;
        let step = v0 * t + 0.5 * acceleration * t * t;
        if step <= 0.0 {
            // Braked to a stop short of the target; close the gap in one move.
            track.push(distance - current);
            return track;
        }
        let step = step.min(distance - current);
        current += step;
        track.push(step);
    }
    track
}

fn ease_in_out_cubic(t: f64) -> f64 {
    if t < 0.5 {
        4.0 * t * t * t
    } else {
        1.0 - (-2.0 * t + 2.0).powi(3) / 2.0
    }
}
