//! Point deletion.
//!
//! The edges of a vertex inside one cell are not always collapsible while
//! some edge elsewhere in its ball is. [`delete_vertex`] widens the search
//! to the whole ball, with the same legality rules as the collapse itself.

use tracing::trace;

use crate::error::Result;
use crate::mesh::{CellId, MeshIndex};

use super::ball::volume_ball_limited;
use super::collapse::collapse_vertex_edges;
use super::optimize::OptimizeContext;

/// Try to remove vertex `local` of `cell` by collapsing any of its edges.
///
/// Balls larger than `deletion_ball_limit` are not attempted. Returns `true`
/// once a collapse succeeds.
pub fn delete_vertex<I: MeshIndex>(ctx: &mut OptimizeContext<'_, I>, cell: CellId<I>, local: usize) -> Result<bool> {
    let limit = ctx.options.deletion_ball_limit;
    let Some(ball) = volume_ball_limited(ctx.mesh, cell, local, limit)? else {
        trace!(cell = ?cell, limit, "ball too large for point deletion");
        return Ok(false);
    };

    for entry in ball {
        if collapse_vertex_edges(ctx, entry.cell, entry.local)?.is_some() {
            return Ok(true);
        }
    }
    Ok(false)
}
