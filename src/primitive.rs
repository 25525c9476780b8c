//! Structural primitives reported by the analysis.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Kind of a structural primitive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PrimitiveKind {
    /// Loop tested at the header (`while`).
    PreTestedLoop,
    /// Loop tested at the latch (`do-while`).
    PostTestedLoop,
    /// Loop with no conditional exit at header or latch.
    EndlessLoop,
    /// Two-way conditional (`if`).
    TwoWayConditional,
}

impl fmt::Display for PrimitiveKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PrimitiveKind::PreTestedLoop => write!(f, "PreTestedLoop"),
            PrimitiveKind::PostTestedLoop => write!(f, "PostTestedLoop"),
            PrimitiveKind::EndlessLoop => write!(f, "EndlessLoop"),
            PrimitiveKind::TwoWayConditional => write!(f, "TwoWayConditional"),
        }
    }
}

/// A structured region of the control flow graph.
///
/// `entry` is the header (or conditional) node, `body` the nodes inside the
/// region in a per-run stable order, and `exit` the follow node where one
/// exists. `extra` names the remaining roles of the region: `"latch"` and
/// `"follow"` for loops, `"cond"` and `"follow"` for conditionals.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Primitive<N> {
    pub kind: PrimitiveKind,
    pub entry: N,
    pub body: Vec<N>,
    pub exit: Option<N>,
    pub extra: HashMap<String, N>,
}
