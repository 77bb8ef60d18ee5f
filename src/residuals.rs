//! Residual visibilities.

use log::debug;
use marlu::c32;
use ndarray::prelude::*;

use crate::{ResamplerError, VisChunk};

/// Subtract the observed visibilities (or the corrected visibilities, if
/// `use_corrected` is true) from `model`, in place, over the chunk's rows.
/// Flags are not consulted.
pub fn compute_residuals(
    mut model: ArrayViewMut3<c32>,
    chunk: &VisChunk,
    use_corrected: bool,
) -> Result<(), ResamplerError> {
    chunk.validate()?;
    chunk.validate_model(&model)?;
    let data = if use_corrected {
        chunk.corrected.as_ref().ok_or(ResamplerError::NoCorrectedData)?
    } else {
        &chunk.vis
    };
    debug!(
        "Computing residuals over rows {:?} (corrected: {use_corrected})",
        chunk.rows
    );

    let mut model_rows = model.slice_mut(s![.., .., chunk.rows.clone()]);
    model_rows -= &data.slice(s![.., .., chunk.rows.clone()]);
    Ok(())
}
