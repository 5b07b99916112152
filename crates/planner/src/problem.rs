//! Transform problem descriptions.

use crate::fingerprint::Fingerprinter;
use crate::tensor::{Dim, Shape};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Element precision, folded into the fingerprint so plans tuned for one
/// width never serve another.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Precision {
    F32,
    #[default]
    F64,
}

impl Precision {
    pub fn element_bytes(self) -> usize {
        match self {
            Precision::F32 => 4,
            Precision::F64 => 8,
        }
    }

    pub(crate) fn tag(self) -> u32 {
        match self {
            Precision::F32 => 0,
            Precision::F64 => 1,
        }
    }
}

/// The closed set of transform kinds the planner understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransformKind {
    /// Complex forward transform (negative exponent sign).
    Forward,
    /// Complex inverse transform (positive exponent sign, unnormalized).
    Inverse,
    /// Real input, half-complex output.
    RealToComplex,
    /// Half-complex input, real output.
    ComplexToReal,
}

impl TransformKind {
    fn tag(self) -> u32 {
        match self {
            TransformKind::Forward => 0,
            TransformKind::Inverse => 1,
            TransformKind::RealToComplex => 2,
            TransformKind::ComplexToReal => 3,
        }
    }

    /// Exponent sign for the complex kinds.
    pub fn sign(self) -> f64 {
        match self {
            TransformKind::Forward | TransformKind::RealToComplex => -1.0,
            TransformKind::Inverse | TransformKind::ComplexToReal => 1.0,
        }
    }

    pub fn is_complex(self) -> bool {
        matches!(self, TransformKind::Forward | TransformKind::Inverse)
    }
}

/// Whether the transform writes over its input or into a separate buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Placement {
    #[default]
    InPlace,
    OutOfPlace,
}

impl Placement {
    fn tag(self) -> u32 {
        match self {
            Placement::InPlace => 0,
            Placement::OutOfPlace => 1,
        }
    }
}

/// An immutable description of one unit of work.
///
/// Problems carry no buffer pointers; buffers are supplied at execution
/// time. Shapes are canonical (see [`Shape`]), so two descriptions that are
/// interchangeable for planning compare and hash identically.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TransformProblem {
    kind: TransformKind,
    shape: Shape,
    batch: Shape,
    placement: Placement,
}

impl TransformProblem {
    pub fn new(kind: TransformKind, shape: Shape, batch: Shape, placement: Placement) -> Self {
        TransformProblem {
            kind,
            shape,
            batch,
            placement,
        }
    }

    /// A contiguous one-dimensional transform of length `n`.
    pub fn one_dimensional(kind: TransformKind, n: usize, placement: Placement) -> Self {
        TransformProblem::new(kind, Shape::contiguous(&[n]), Shape::scalar(), placement)
    }

    pub fn forward_1d(n: usize) -> Self {
        TransformProblem::one_dimensional(TransformKind::Forward, n, Placement::InPlace)
    }

    pub fn inverse_1d(n: usize) -> Self {
        TransformProblem::one_dimensional(TransformKind::Inverse, n, Placement::InPlace)
    }

    /// Repeat this transform over `count` contiguous batches.
    pub fn with_batch(mut self, count: usize) -> Self {
        let inner = (self.shape.total_points() * self.batch.total_points()) as isize;
        let mut dims = self.batch.dims().to_vec();
        dims.push(Dim::new(count, inner, inner));
        self.batch = Shape::new(dims);
        self
    }

    pub fn kind(&self) -> TransformKind {
        self.kind
    }

    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    pub fn batch(&self) -> &Shape {
        &self.batch
    }

    pub fn placement(&self) -> Placement {
        self.placement
    }

    /// Transform length for rank-1 problems.
    pub fn length(&self) -> Option<usize> {
        match self.shape.dims() {
            [d] => Some(d.n),
            _ => None,
        }
    }

    /// Total number of points, batches included.
    pub fn total_points(&self) -> usize {
        self.shape.total_points() * self.batch.total_points()
    }

    pub(crate) fn hash_signature(&self, fp: &mut Fingerprinter) {
        fp.add_tag("problem");
        fp.add_u32(self.kind.tag());
        fp.add_u32(self.placement.tag());
        self.shape.hash_signature(fp);
        self.batch.hash_signature(fp);
    }
}

impl fmt::Debug for TransformProblem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:?} {:?} batch {:?} ({:?})",
            self.kind, self.shape, self.batch, self.placement
        )
    }
}
