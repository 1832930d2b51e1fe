//! Grab state per ball, the registry of live balls, and the gate deciding
//! whether the arms may touch a ball at all.

use std::collections::{HashMap, HashSet};
use std::hash::Hash;
use std::time::Duration;

use tracing::debug;

#[derive(Debug, Clone, Copy, Eq, PartialEq, Default)]
pub struct GrabState {
	pub is_held: bool,
	/// Time of the last release, `None` if the ball was never released.
	pub last_release: Option<Duration>,
}

impl GrabState {
	/// Whether arm colliders may collide with this ball at `now`.
	pub fn should_collide(&self, now: Duration, cooldown: Duration) -> bool {
		if self.is_held {
			return false;
		}
		match self.last_release {
			None => true,
			Some(released) => now.saturating_sub(released) >= cooldown,
		}
	}
}

/// Tracks grab and release events per ball. Balls start out free.
#[derive(Debug, Clone)]
pub struct GrabStateTracker<K> {
	states: HashMap<K, GrabState>,
}

impl<K> Default for GrabStateTracker<K> {
	fn default() -> Self {
		Self {
			states: HashMap::new(),
		}
	}
}

impl<K: Eq + Hash + Copy + std::fmt::Debug> GrabStateTracker<K> {
	pub fn on_grab_begin(&mut self, ball: K) {
		let state = self.states.entry(ball).or_default();
		if !state.is_held {
			debug!(?ball, "ball grabbed");
		}
		state.is_held = true;
	}

	/// Releasing a ball that is not held still restarts the cooldown.
	pub fn on_grab_end(&mut self, ball: K, now: Duration) {
		let state = self.states.entry(ball).or_default();
		if state.is_held {
			debug!(?ball, "ball released");
		}
		state.is_held = false;
		state.last_release = Some(now);
	}

	pub fn state(&self, ball: &K) -> GrabState {
		self.states.get(ball).copied().unwrap_or_default()
	}

	pub fn is_held(&self, ball: &K) -> bool {
		self.state(ball).is_held
	}

	pub fn should_collide(&self, ball: &K, now: Duration, cooldown: Duration) -> bool {
		self.state(ball).should_collide(now, cooldown)
	}

	pub fn remove(&mut self, ball: &K) {
		self.states.remove(ball);
	}
}

/// The set of balls currently alive, maintained by whoever spawns them.
#[derive(Debug, Clone)]
pub struct BallRegistry<K> {
	balls: HashSet<K>,
}

impl<K> Default for BallRegistry<K> {
	fn default() -> Self {
		Self {
			balls: HashSet::new(),
		}
	}
}

impl<K: Eq + Hash + Copy + std::fmt::Debug> BallRegistry<K> {
	/// Returns `false` if the ball was already registered.
	pub fn register(&mut self, ball: K) -> bool {
		let inserted = self.balls.insert(ball);
		if inserted {
			debug!(?ball, "registered ball");
		}
		inserted
	}

	/// Returns `false` if the ball was not registered.
	pub fn unregister(&mut self, ball: &K) -> bool {
		let removed = self.balls.remove(ball);
		if removed {
			debug!(?ball, "unregistered ball");
		}
		removed
	}

	pub fn contains(&self, ball: &K) -> bool {
		self.balls.contains(ball)
	}

	pub fn iter(&self) -> impl Iterator<Item = &K> {
		self.balls.iter()
	}

	pub fn len(&self) -> usize {
		self.balls.len()
	}

	pub fn is_empty(&self) -> bool {
		self.balls.is_empty()
	}
}

/// Result of evaluating the grab gate for every registered ball.
///
/// This is level triggered: [`CollisionGate::refresh`] recomputes the whole set
/// every frame, and the physics filter only ever reads the latest result.
#[derive(Debug, Clone)]
pub struct CollisionGate<K> {
	suppressed: HashSet<K>,
}

impl<K> Default for CollisionGate<K> {
	fn default() -> Self {
		Self {
			suppressed: HashSet::new(),
		}
	}
}

impl<K: Eq + Hash + Copy + std::fmt::Debug> CollisionGate<K> {
	pub fn refresh(
		&mut self,
		registry: &BallRegistry<K>,
		grabs: &GrabStateTracker<K>,
		now: Duration,
		cooldown: Duration,
	) {
		self.suppressed.clear();
		self.suppressed.extend(
			registry
				.iter()
				.filter(|ball| !grabs.should_collide(ball, now, cooldown))
				.copied(),
		);
	}

	/// Whether contacts between any arm collider and `ball` should be
	/// generated.
	pub fn should_collide(&self, ball: &K) -> bool {
		!self.suppressed.contains(ball)
	}

	pub fn suppressed(&self) -> impl Iterator<Item = &K> {
		self.suppressed.iter()
	}
}
