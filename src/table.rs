use std::{
    fs::File,
    io::{BufReader, BufWriter, Write},
    ops::{Index, IndexMut},
    path::Path,
};

use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::{
    env::{Action, Pos},
    error::TableError,
};

/// On-disk form of a table: a dense row-major array and its shape
#[derive(Serialize, Deserialize)]
struct ArrayFile<D> {
    shape: Vec<usize>,
    data: D,
}

fn write_array<T: Serialize>(path: &Path, shape: Vec<usize>, data: &[T]) -> Result<(), TableError> {
    let io_err = |source: std::io::Error| TableError::Io {
        path: path.to_path_buf(),
        source,
    };

    let file = File::create(path).map_err(io_err)?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer(&mut writer, &ArrayFile { shape, data }).map_err(|source| {
        TableError::Json {
            path: path.to_path_buf(),
            source,
        }
    })?;
    writer.flush().map_err(io_err)?;

    log::debug!("Wrote table {}", path.display());
    Ok(())
}

fn read_array<T: DeserializeOwned>(
    path: &Path,
    expected: Vec<usize>,
) -> Result<Vec<T>, TableError> {
    let file = File::open(path).map_err(|source| TableError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let reader = BufReader::new(file);
    let file: ArrayFile<Vec<T>> =
        serde_json::from_reader(reader).map_err(|source| TableError::Json {
            path: path.to_path_buf(),
            source,
        })?;
    let ArrayFile { shape, data } = file;

    if shape != expected {
        return Err(TableError::ShapeMismatch {
            path: path.to_path_buf(),
            expected,
            found: shape,
        });
    }

    let len = shape.iter().product::<usize>();
    if data.len() != len {
        return Err(TableError::Corrupt {
            path: path.to_path_buf(),
            shape,
            expected: len,
            found: data.len(),
        });
    }

    log::debug!("Read table {}", path.display());
    Ok(data)
}

/// A dense `size × size` table with one entry per grid cell
///
/// Stored row-major, so the entry for `(x, y)` lives at `y * size + x`.
#[derive(Debug, Clone, PartialEq)]
pub struct StateTable<T> {
    size: usize,
    cells: Vec<T>,
}

impl<T: Clone> StateTable<T> {
    /// Create a table with every cell set to `value`
    pub fn filled(size: usize, value: T) -> Self {
        Self {
            size,
            cells: vec![value; size * size],
        }
    }
}

impl<T> StateTable<T> {
    /// Create a table by evaluating `f` at every cell
    pub fn from_fn(size: usize, mut f: impl FnMut(Pos) -> T) -> Self {
        let mut cells = Vec::with_capacity(size * size);
        for y in 0..size {
            for x in 0..size {
                cells.push(f((x, y)));
            }
        }
        Self { size, cells }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Table dimensions, `[rows, columns]`
    pub fn shape(&self) -> Vec<usize> {
        vec![self.size, self.size]
    }

    /// Entries in row-major order
    pub fn as_slice(&self) -> &[T] {
        &self.cells
    }

    /// Iterate over `(pos, value)` pairs in row-major order
    pub fn iter(&self) -> impl Iterator<Item = (Pos, &T)> {
        let size = self.size;
        self.cells
            .iter()
            .enumerate()
            .map(move |(i, v)| ((i % size, i / size), v))
    }
}

impl<T: Serialize + DeserializeOwned> StateTable<T> {
    /// Write the table to `path`
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), TableError> {
        write_array(path.as_ref(), self.shape(), &self.cells)
    }

    /// Read a table written by [`StateTable::save`]
    ///
    /// Fails with [`TableError::ShapeMismatch`] unless the file holds a `size × size` array.
    pub fn load(path: impl AsRef<Path>, size: usize) -> Result<Self, TableError> {
        let cells = read_array(path.as_ref(), vec![size, size])?;
        Ok(Self { size, cells })
    }
}

impl<T> Index<Pos> for StateTable<T> {
    type Output = T;

    fn index(&self, (x, y): Pos) -> &Self::Output {
        debug_assert!(x < self.size && y < self.size);
        &self.cells[y * self.size + x]
    }
}

impl<T> IndexMut<Pos> for StateTable<T> {
    fn index_mut(&mut self, (x, y): Pos) -> &mut Self::Output {
        debug_assert!(x < self.size && y < self.size);
        &mut self.cells[y * self.size + x]
    }
}

/// Per-cell state values
pub type ValueTable = StateTable<f64>;

/// Per-cell chosen actions
pub type PolicyTable = StateTable<Action>;

/// A dense `size × size × 4` table with one entry per state-action pair
#[derive(Debug, Clone, PartialEq)]
pub struct ActionTable<T> {
    size: usize,
    entries: Vec<T>,
}

impl<T: Clone> ActionTable<T> {
    /// Create a table with every entry set to `value`
    pub fn filled(size: usize, value: T) -> Self {
        Self {
            size,
            entries: vec![value; size * size * Action::COUNT],
        }
    }
}

impl<T> ActionTable<T> {
    pub fn size(&self) -> usize {
        self.size
    }

    /// Table dimensions, `[rows, columns, actions]`
    pub fn shape(&self) -> Vec<usize> {
        vec![self.size, self.size, Action::COUNT]
    }

    /// All entries for one cell, in action index order
    pub fn row(&self, (x, y): Pos) -> &[T] {
        let start = (y * self.size + x) * Action::COUNT;
        &self.entries[start..start + Action::COUNT]
    }

    pub fn as_slice(&self) -> &[T] {
        &self.entries
    }

    pub fn as_mut_slice(&mut self) -> &mut [T] {
        &mut self.entries
    }
}

impl ActionTable<f64> {
    /// Largest entry for a cell
    pub fn max(&self, pos: Pos) -> f64 {
        self.row(pos)
            .iter()
            .copied()
            .fold(f64::NEG_INFINITY, f64::max)
    }

    /// First action with the largest entry for a cell
    pub fn greedy(&self, pos: Pos) -> Action {
        Action::from_index(crate::util::argmax(self.row(pos)))
    }

    /// Greedy action at every cell
    pub fn greedy_policy(&self) -> PolicyTable {
        StateTable::from_fn(self.size, |pos| self.greedy(pos))
    }
}

impl<T: Serialize + DeserializeOwned> ActionTable<T> {
    /// Write the table to `path`
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), TableError> {
        write_array(path.as_ref(), self.shape(), &self.entries)
    }

    /// Read a table written by [`ActionTable::save`]
    ///
    /// Fails with [`TableError::ShapeMismatch`] unless the file holds a `size × size × 4` array.
    pub fn load(path: impl AsRef<Path>, size: usize) -> Result<Self, TableError> {
        let entries = read_array(path.as_ref(), vec![size, size, Action::COUNT])?;
        Ok(Self { size, entries })
    }
}

impl<T> Index<(Pos, Action)> for ActionTable<T> {
    type Output = T;

    fn index(&self, ((x, y), action): (Pos, Action)) -> &Self::Output {
        debug_assert!(x < self.size && y < self.size);
        &self.entries[(y * self.size + x) * Action::COUNT + action.index()]
    }
}

impl<T> IndexMut<(Pos, Action)> for ActionTable<T> {
    fn index_mut(&mut self, ((x, y), action): (Pos, Action)) -> &mut Self::Output {
        debug_assert!(x < self.size && y < self.size);
        &mut self.entries[(y * self.size + x) * Action::COUNT + action.index()]
    }
}

/// Action values
pub type QTable = ActionTable<f64>;

/// Fraction of cells where two policies disagree, restricted to cells accepted by `include`
pub fn policy_change(
    previous: &PolicyTable,
    current: &PolicyTable,
    include: impl Fn(Pos) -> bool,
) -> f64 {
    let (changed, total) = previous
        .iter()
        .filter(|&(pos, _)| include(pos))
        .fold((0usize, 0usize), |(changed, total), (pos, action)| {
            (changed + usize::from(*action != current[pos]), total + 1)
        });

    if total == 0 {
        0.0
    } else {
        changed as f64 / total as f64
    }
}
