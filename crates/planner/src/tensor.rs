//! Canonical shape/stride descriptions for transform problems.

use crate::fingerprint::Fingerprinter;
use serde::{Deserialize, Serialize};
use std::fmt;

/// One dimension of a (possibly strided) tensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Dim {
    pub n: usize,
    pub input_stride: isize,
    pub output_stride: isize,
}

impl Dim {
    pub fn new(n: usize, input_stride: isize, output_stride: isize) -> Dim {
        Dim {
            n,
            input_stride,
            output_stride,
        }
    }
}

/// An ordered list of dimensions in canonical form.
///
/// Canonicalization makes planning-equivalent layouts hash identically:
/// size-1 dimensions are dropped, dimensions are ordered by descending
/// stride, and nested contiguous dimensions are merged into one.
#[derive(Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Shape {
    dims: Vec<Dim>,
}

impl Shape {
    pub fn new(dims: Vec<Dim>) -> Shape {
        Shape {
            dims: canonicalize(dims),
        }
    }

    /// The rank-0 shape (a single point).
    pub fn scalar() -> Shape {
        Shape { dims: Vec::new() }
    }

    /// A row-major contiguous shape with identical input/output strides.
    pub fn contiguous(ns: &[usize]) -> Shape {
        let mut stride = 1isize;
        let mut dims: Vec<Dim> = ns
            .iter()
            .rev()
            .map(|&n| {
                let d = Dim::new(n, stride, stride);
                stride *= n as isize;
                d
            })
            .collect();
        dims.reverse();
        Shape::new(dims)
    }

    pub fn rank(&self) -> usize {
        self.dims.len()
    }

    pub fn dims(&self) -> &[Dim] {
        &self.dims
    }

    pub fn is_scalar(&self) -> bool {
        self.dims.is_empty()
    }

    /// Total number of points covered by this shape.
    pub fn total_points(&self) -> usize {
        self.dims.iter().map(|d| d.n).product()
    }

    pub(crate) fn hash_signature(&self, fp: &mut Fingerprinter) {
        fp.add_usize(self.dims.len());
        for d in &self.dims {
            fp.add_usize(d.n);
            fp.add_isize(d.input_stride);
            fp.add_isize(d.output_stride);
        }
    }
}

fn canonicalize(mut dims: Vec<Dim>) -> Vec<Dim> {
    dims.retain(|d| d.n != 1);
    dims.sort_by(|a, b| {
        (b.input_stride.abs(), b.output_stride.abs())
            .cmp(&(a.input_stride.abs(), a.output_stride.abs()))
    });

    let mut out: Vec<Dim> = Vec::with_capacity(dims.len());
    for d in dims {
        if let Some(last) = out.last_mut() {
            let nests = last.input_stride == d.n as isize * d.input_stride
                && last.output_stride == d.n as isize * d.output_stride;
            if nests {
                *last = Dim::new(last.n * d.n, d.input_stride, d.output_stride);
                continue;
            }
        }
        out.push(d);
    }
    out
}

impl fmt::Debug for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, d) in self.dims.iter().enumerate() {
            if i > 0 {
                write!(f, " x ")?;
            }
            write!(f, "{}:{}:{}", d.n, d.input_stride, d.output_stride)?;
        }
        write!(f, "]")
    }
}
