use std::collections::BTreeSet;

use rand::Rng;
use serde::{Deserialize, Serialize};
use strum::{EnumIter, FromRepr, VariantArray};

use crate::error::{ConfigError, TableError};

use super::{DiscreteActionSpace, DiscreteStateSpace, Environment, Model, Outcome};

/// Cell coordinates `(x, y)`, column first, with `(0, 0)` in the bottom left corner
pub type Pos = (usize, usize);

const GOAL_REWARD: f64 = 10.0;
const OBSTACLE_PENALTY: f64 = -1.0;
const STEP_COST: f64 = -0.1;

/// A move on the grid
///
/// The discriminant is the action index used in tables and table files.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq)]
#[derive(EnumIter, VariantArray, FromRepr, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
#[repr(u8)]
pub enum Action {
    Up = 0,
    Right = 1,
    Down = 2,
    Left = 3,
}

impl Action {
    /// Number of actions
    pub const COUNT: usize = 4;

    /// Table index of this action
    pub fn index(self) -> usize {
        self as usize
    }

    /// Inverse of [`Action::index`]
    ///
    /// **Panics** if `index >= Action::COUNT`
    pub fn from_index(index: usize) -> Self {
        Self::VARIANTS[index]
    }

    /// Sample a uniformly random action
    pub fn random<R: Rng + ?Sized>(rng: &mut R) -> Self {
        Self::from_index(rng.gen_range(0..Self::COUNT))
    }

    /// Move `pos` one cell, staying put on an axis that would leave a grid of side `size`
    fn apply(self, (x, y): Pos, size: usize) -> Pos {
        match self {
            Action::Up if y + 1 < size => (x, y + 1),
            Action::Right if x + 1 < size => (x + 1, y),
            Action::Down if y > 0 => (x, y - 1),
            Action::Left if x > 0 => (x - 1, y),
            _ => (x, y),
        }
    }

    /// Arrow glyph for text output
    pub fn arrow(self) -> char {
        match self {
            Action::Up => '↑',
            Action::Right => '→',
            Action::Down => '↓',
            Action::Left => '←',
        }
    }
}

impl From<Action> for u8 {
    fn from(action: Action) -> Self {
        action as u8
    }
}

impl TryFrom<u8> for Action {
    type Error = TableError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Action::from_repr(value).ok_or(TableError::InvalidAction(value))
    }
}

/// Layout of a [`GridWorld`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GridConfig {
    /// Side length of the square grid
    pub size: usize,
    pub start: Pos,
    pub goals: Vec<Pos>,
    pub obstacles: Vec<Pos>,
    /// Step budget of a live episode
    pub max_steps: u32,
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            size: 6,
            start: (0, 0),
            goals: vec![(5, 5), (4, 2)],
            obstacles: vec![(1, 1), (2, 2), (3, 1)],
            max_steps: 50,
        }
    }
}

impl GridConfig {
    /// Largest accepted side length; a Q-table for it holds `4 * MAX_SIZE²` entries
    pub const MAX_SIZE: usize = 1024;

    fn validate(&self) -> Result<(), ConfigError> {
        let size = self.size;
        if size == 0 {
            return Err(ConfigError::EmptyGrid);
        }
        if size > Self::MAX_SIZE {
            return Err(ConfigError::GridTooLarge {
                size,
                max: Self::MAX_SIZE,
            });
        }
        if self.max_steps == 0 {
            return Err(ConfigError::NoStepBudget);
        }
        if self.goals.is_empty() {
            return Err(ConfigError::NoGoals);
        }

        let in_bounds = |what, pos: Pos| {
            if pos.0 < size && pos.1 < size {
                Ok(())
            } else {
                Err(ConfigError::OutOfBounds { what, pos, size })
            }
        };
        in_bounds("start", self.start)?;
        for &goal in &self.goals {
            in_bounds("goal", goal)?;
        }
        for &obstacle in &self.obstacles {
            in_bounds("obstacle", obstacle)?;
        }

        if let Some(&pos) = self.goals.iter().find(|g| self.obstacles.contains(g)) {
            return Err(ConfigError::GoalOnObstacle(pos));
        }
        if self.obstacles.contains(&self.start) {
            return Err(ConfigError::StartOnObstacle(self.start));
        }

        Ok(())
    }
}

/// Parse a position written as `x-y`
pub fn parse_position(s: &str) -> Result<Pos, ConfigError> {
    let bad = || ConfigError::BadPosition(s.to_string());
    let (x, y) = s.trim().split_once('-').ok_or_else(bad)?;
    let x = x.trim().parse().map_err(|_| bad())?;
    let y = y.trim().parse().map_err(|_| bad())?;
    Ok((x, y))
}

/// Parse a comma separated list of `x-y` positions; an empty string is an empty list
pub fn parse_positions(s: &str) -> Result<Vec<Pos>, ConfigError> {
    s.split(',')
        .filter(|part| !part.trim().is_empty())
        .map(parse_position)
        .collect()
}

/// A deterministic square grid with obstacles and one or more goals
///
/// Every move costs a little, bumping into an obstacle costs more and leaves the
/// agent where it was, and entering a goal ends the episode with a large reward.
/// Live episodes are additionally cut off after `max_steps` steps.
#[derive(Debug, Clone)]
pub struct GridWorld {
    size: usize,
    start: Pos,
    goals: BTreeSet<Pos>,
    obstacles: BTreeSet<Pos>,
    max_steps: u32,
    pos: Pos,
    steps: u32,
}

impl GridWorld {
    /// Build a grid world, rejecting layouts that do not fit the grid or that overlap
    pub fn new(config: GridConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let GridConfig {
            size,
            start,
            goals,
            obstacles,
            max_steps,
        } = config;

        Ok(Self {
            size,
            start,
            goals: goals.into_iter().collect(),
            obstacles: obstacles.into_iter().collect(),
            max_steps,
            pos: start,
            steps: 0,
        })
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn start(&self) -> Pos {
        self.start
    }

    pub fn max_steps(&self) -> u32 {
        self.max_steps
    }

    /// Current agent position
    pub fn position(&self) -> Pos {
        self.pos
    }

    /// Steps taken since the last reset
    pub fn steps(&self) -> u32 {
        self.steps
    }

    pub fn goals(&self) -> impl Iterator<Item = Pos> + '_ {
        self.goals.iter().copied()
    }

    pub fn obstacles(&self) -> impl Iterator<Item = Pos> + '_ {
        self.obstacles.iter().copied()
    }

    pub fn is_goal(&self, pos: Pos) -> bool {
        self.goals.contains(&pos)
    }

    pub fn is_obstacle(&self, pos: Pos) -> bool {
        self.obstacles.contains(&pos)
    }

    /// Cells whose value is updated by the planning and learning methods
    ///
    /// Obstacles can never be occupied and goals end the episode, so neither has
    /// outgoing transitions worth estimating.
    pub fn is_updatable(&self, pos: Pos) -> bool {
        !self.is_obstacle(pos) && !self.is_goal(pos)
    }

    /// The single transition rule shared by [`Environment::step`] and [`Model::simulate_step`]
    fn transition(&self, state: Pos, action: Action) -> Outcome<Pos> {
        let target = action.apply(state, self.size);

        let (next_state, reward, terminated) = if self.is_obstacle(target) {
            (state, OBSTACLE_PENALTY, false)
        } else if self.is_goal(target) {
            (target, GOAL_REWARD, true)
        } else {
            (target, STEP_COST, false)
        };

        Outcome {
            next_state,
            reward,
            terminated,
            truncated: false,
        }
    }
}

impl Environment for GridWorld {
    type State = Pos;
    type Action = Action;

    fn step(&mut self, action: Self::Action) -> Outcome<Self::State> {
        self.steps += 1;
        let mut outcome = self.transition(self.pos, action);
        self.pos = outcome.next_state;
        outcome.truncated = !outcome.terminated && self.steps >= self.max_steps;
        outcome
    }

    fn reset(&mut self) -> Self::State {
        self.pos = self.start;
        self.steps = 0;
        self.pos
    }

    fn random_action<R: Rng + ?Sized>(&self, rng: &mut R) -> Self::Action {
        Action::random(rng)
    }
}

impl DiscreteActionSpace for GridWorld {
    fn actions(&self) -> Vec<Self::Action> {
        Action::VARIANTS.to_vec()
    }
}

impl DiscreteStateSpace for GridWorld {
    /// All cells in row-major order, bottom row first
    fn states(&self) -> Vec<Self::State> {
        (0..self.size)
            .flat_map(|y| (0..self.size).map(move |x| (x, y)))
            .collect()
    }
}

impl Model for GridWorld {
    fn simulate_step(&self, state: Self::State, action: Self::Action) -> Outcome<Self::State> {
        self.transition(state, action)
    }
}

#[cfg(test)]
mod tests {
    use strum::IntoEnumIterator;

    use super::*;

    fn open_grid(size: usize, goal: Pos) -> GridWorld {
        GridWorld::new(GridConfig {
            size,
            start: (0, 0),
            goals: vec![goal],
            obstacles: vec![],
            max_steps: 100,
        })
        .unwrap()
    }

    #[test]
    fn position_parsing() {
        assert_eq!(parse_position("4-2"), Ok((4, 2)));
        assert_eq!(parse_position(" 0 - 5 "), Ok((0, 5)));
        assert_eq!(
            parse_position("4,2"),
            Err(ConfigError::BadPosition("4,2".to_string()))
        );
        assert!(parse_position("-1-2").is_err());
        assert_eq!(parse_positions("5-5, 4-2"), Ok(vec![(5, 5), (4, 2)]));
        assert_eq!(parse_positions(""), Ok(vec![]));
        assert!(parse_positions("1-1,x-2").is_err());
    }

    #[test]
    fn grid_actions() {
        let mut env = open_grid(4, (3, 3));
        assert_eq!(env.reset(), (0, 0));

        assert_eq!(env.step(Action::Up).next_state, (0, 1), "Up action works");
        assert_eq!(env.step(Action::Right).next_state, (1, 1), "Right action works");
        assert_eq!(env.step(Action::Down).next_state, (1, 0), "Down action works");
        assert_eq!(env.step(Action::Left).next_state, (0, 0), "Left action works");
        assert_eq!(env.steps(), 4, "Steps are counted");
    }

    #[test]
    fn boundary_clamp() {
        let size = 3;
        let env = open_grid(size, (1, 1));
        for state in env.states() {
            for action in Action::iter() {
                let outcome = env.simulate_step(state, action);
                if outcome.terminated {
                    continue;
                }
                let (x, y) = state;
                let expected = match action {
                    Action::Up => (x, (y + 1).min(size - 1)),
                    Action::Right => ((x + 1).min(size - 1), y),
                    Action::Down => (x, y.saturating_sub(1)),
                    Action::Left => (x.saturating_sub(1), y),
                };
                assert_eq!(outcome.next_state, expected, "{action:?} from {state:?}");
                assert_eq!(outcome.reward, STEP_COST);
            }
        }
    }

    #[test]
    fn obstacle_rejects_move() {
        let mut env = GridWorld::new(GridConfig {
            size: 3,
            start: (0, 0),
            goals: vec![(2, 2)],
            obstacles: vec![(1, 0)],
            max_steps: 10,
        })
        .unwrap();
        env.reset();

        let outcome = env.step(Action::Right);
        assert_eq!(outcome.next_state, (0, 0), "Position reverts");
        assert_eq!(env.position(), (0, 0));
        assert_eq!(outcome.reward, OBSTACLE_PENALTY);
        assert!(!outcome.done());
    }

    #[test]
    fn goal_terminates() {
        let mut env = open_grid(2, (1, 0));
        env.reset();
        let outcome = env.step(Action::Right);
        assert_eq!(outcome.reward, GOAL_REWARD);
        assert!(outcome.terminated);
        assert!(!outcome.truncated);
    }

    #[test]
    fn step_limit_truncates() {
        let mut env = GridWorld::new(GridConfig {
            size: 3,
            start: (0, 0),
            goals: vec![(2, 2)],
            obstacles: vec![],
            max_steps: 3,
        })
        .unwrap();
        env.reset();
        assert!(!env.step(Action::Left).done());
        assert!(!env.step(Action::Left).done());
        let outcome = env.step(Action::Left);
        assert!(outcome.truncated && !outcome.terminated);

        env.reset();
        assert_eq!(env.steps(), 0, "Reset clears the step counter");
    }

    #[test]
    fn step_matches_simulate_step() {
        let env = GridWorld::new(GridConfig::default()).unwrap();
        for state in env.states() {
            if env.is_obstacle(state) {
                continue;
            }
            for action in Action::iter() {
                let simulated = env.simulate_step(state, action);

                let mut live = env.clone();
                live.pos = state;
                let stepped = live.step(action);

                assert_eq!(stepped.next_state, simulated.next_state);
                assert_eq!(stepped.reward, simulated.reward);
                assert_eq!(stepped.terminated, simulated.terminated);
                assert_eq!(live.position(), stepped.next_state);
            }
        }
    }

    #[test]
    fn simulate_step_is_pure() {
        let mut env = GridWorld::new(GridConfig::default()).unwrap();
        env.reset();
        env.step(Action::Up);
        let (pos, steps) = (env.position(), env.steps());
        env.simulate_step((4, 4), Action::Right);
        assert_eq!((env.position(), env.steps()), (pos, steps));
    }

    #[test]
    fn rejects_bad_layouts() {
        let base = GridConfig::default();
        let cases = [
            (
                GridConfig {
                    size: 0,
                    ..base.clone()
                },
                ConfigError::EmptyGrid,
            ),
            (
                GridConfig {
                    goals: vec![(6, 0)],
                    ..base.clone()
                },
                ConfigError::OutOfBounds {
                    what: "goal",
                    pos: (6, 0),
                    size: 6,
                },
            ),
            (
                GridConfig {
                    obstacles: vec![(0, 9)],
                    ..base.clone()
                },
                ConfigError::OutOfBounds {
                    what: "obstacle",
                    pos: (0, 9),
                    size: 6,
                },
            ),
            (
                GridConfig {
                    goals: vec![(1, 1)],
                    ..base.clone()
                },
                ConfigError::GoalOnObstacle((1, 1)),
            ),
            (
                GridConfig {
                    start: (2, 2),
                    ..base.clone()
                },
                ConfigError::StartOnObstacle((2, 2)),
            ),
            (
                GridConfig {
                    goals: vec![],
                    ..base.clone()
                },
                ConfigError::NoGoals,
            ),
            (
                GridConfig {
                    max_steps: 0,
                    ..base.clone()
                },
                ConfigError::NoStepBudget,
            ),
            (
                GridConfig {
                    size: usize::MAX,
                    ..base.clone()
                },
                ConfigError::GridTooLarge {
                    size: usize::MAX,
                    max: GridConfig::MAX_SIZE,
                },
            ),
            (
                GridConfig {
                    size: GridConfig::MAX_SIZE + 1,
                    ..base.clone()
                },
                ConfigError::GridTooLarge {
                    size: GridConfig::MAX_SIZE + 1,
                    max: GridConfig::MAX_SIZE,
                },
            ),
        ];

        for (config, expected) in cases {
            assert_eq!(GridWorld::new(config).unwrap_err(), expected);
        }
    }

    #[test]
    fn largest_grid_is_accepted() {
        let env = GridWorld::new(GridConfig {
            size: GridConfig::MAX_SIZE,
            ..Default::default()
        });
        assert!(env.is_ok());
    }

    #[test]
    fn action_index_round_trip() {
        for action in Action::iter() {
            assert_eq!(Action::from_index(action.index()), action);
            assert_eq!(Action::try_from(u8::from(action)).unwrap(), action);
        }
        assert!(Action::try_from(4).is_err());
    }
}
