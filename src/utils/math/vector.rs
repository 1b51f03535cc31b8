use std::{cmp::Ordering, ops::AddAssign};

use num::Num;
use serde::{Deserialize, Serialize};

/// Sparse vector keyed by feature id.
///
/// Entries are kept sorted by index and never contain duplicate indices,
/// so merge-style iteration over two vectors is linear.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SparseVector<N = f64>
where
    N: Num + Copy,
{
    inds: Vec<u32>,
    vals: Vec<N>,
}

impl<N> SparseVector<N>
where
    N: Num + Copy + AddAssign,
{
    pub fn new() -> Self {
        Self {
            inds: Vec::new(),
            vals: Vec::new(),
        }
    }

    /// Build from unordered pairs. Repeated indices are summed, zeros dropped.
    pub fn from_pairs<I>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (u32, N)>,
    {
        let mut pairs: Vec<(u32, N)> = pairs.into_iter().collect();
        pairs.sort_by_key(|(i, _)| *i);
        let mut out = Self::new();
        for (idx, val) in pairs {
            match out.inds.last() {
                Some(&last) if last == idx => {
                    if let Some(v) = out.vals.last_mut() {
                        *v += val;
                    }
                }
                _ => {
                    out.inds.push(idx);
                    out.vals.push(val);
                }
            }
        }
        out.prune();
        out
    }

    #[inline]
    pub fn nnz(&self) -> usize {
        self.inds.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.inds.is_empty()
    }

    pub fn get(&self, index: u32) -> N {
        match self.inds.binary_search(&index) {
            Ok(pos) => self.vals[pos],
            Err(_) => N::zero(),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (u32, N)> + '_ {
        self.inds.iter().copied().zip(self.vals.iter().copied())
    }

    /// Dot product, accumulated in `R`.
    pub fn dot<R>(&self, other: &Self) -> R
    where
        R: Num + AddAssign,
        N: Into<R>,
    {
        let mut result = R::zero();
        let (mut i, mut j) = (0, 0);
        while i < self.inds.len() && j < other.inds.len() {
            match self.inds[i].cmp(&other.inds[j]) {
                Ordering::Equal => {
                    result += self.vals[i].into() * other.vals[j].into();
                    i += 1;
                    j += 1;
                }
                Ordering::Less => i += 1,
                Ordering::Greater => j += 1,
            }
        }
        result
    }

    /// `self += other * scale`
    pub fn add_scaled(&mut self, other: &Self, scale: N) {
        let mut inds = Vec::with_capacity(self.inds.len() + other.inds.len());
        let mut vals = Vec::with_capacity(inds.capacity());
        let (mut i, mut j) = (0, 0);
        while i < self.inds.len() || j < other.inds.len() {
            let ord = match (self.inds.get(i), other.inds.get(j)) {
                (Some(a), Some(b)) => a.cmp(b),
                (Some(_), None) => Ordering::Less,
                _ => Ordering::Greater,
            };
            match ord {
                Ordering::Equal => {
                    inds.push(self.inds[i]);
                    vals.push(self.vals[i] + other.vals[j] * scale);
                    i += 1;
                    j += 1;
                }
                Ordering::Less => {
                    inds.push(self.inds[i]);
                    vals.push(self.vals[i]);
                    i += 1;
                }
                Ordering::Greater => {
                    inds.push(other.inds[j]);
                    vals.push(other.vals[j] * scale);
                    j += 1;
                }
            }
        }
        self.inds = inds;
        self.vals = vals;
        self.prune();
    }

    fn prune(&mut self) {
        let mut k = 0;
        for n in 0..self.inds.len() {
            if self.vals[n] != N::zero() {
                self.inds[k] = self.inds[n];
                self.vals[k] = self.vals[n];
                k += 1;
            }
        }
        self.inds.truncate(k);
        self.vals.truncate(k);
    }
}

impl<N> SparseVector<N>
where
    N: Num + Copy + AddAssign + Into<f64>,
{
    pub fn norm(&self) -> f64 {
        self.vals
            .iter()
            .map(|v| {
                let v: f64 = (*v).into();
                v * v
            })
            .sum::<f64>()
            .sqrt()
    }

    /// cosθ = A・B / (|A||B|), 0 when either side is empty
    pub fn cosine(&self, other: &Self) -> f64 {
        let denom = self.norm() * other.norm();
        if denom == 0.0 {
            return 0.0;
        }
        self.dot::<f64>(other) / denom
    }
}

impl SparseVector<f64> {
    pub fn scale(&mut self, factor: f64) {
        self.vals.iter_mut().for_each(|v| *v *= factor);
        self.prune();
    }
}
