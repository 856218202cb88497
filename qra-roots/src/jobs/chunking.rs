//! Contiguous fixed-size chunking

use super::{Chunk, ChunkWork};
use crate::error::{PipelineError, PipelineResult};

fn check_size(chunk_size: usize) -> PipelineResult<()> {
    if chunk_size == 0 {
        return Err(PipelineError::Config("chunk size must be at least 1".to_string()));
    }
    Ok(())
}

/// Split ordered token ids into chunks of at most `chunk_size`
pub fn chunk_token_ids(ids: &[i64], chunk_size: usize) -> PipelineResult<Vec<Chunk>> {
    check_size(chunk_size)?;

    Ok(ids
        .chunks(chunk_size)
        .enumerate()
        .map(|(chunk_id, ids)| Chunk {
            chunk_id,
            work: ChunkWork::Tokens { ids: ids.to_vec() },
        })
        .collect())
}

/// Split sorted verse numbers into inclusive ranges of at most `chunk_size` verses
pub fn chunk_verses(verses: &[i64], chunk_size: usize) -> PipelineResult<Vec<Chunk>> {
    check_size(chunk_size)?;

    Ok(verses
        .chunks(chunk_size)
        .enumerate()
        .filter_map(|(chunk_id, group)| {
            let (first, last) = (group.first()?, group.last()?);
            Some(Chunk {
                chunk_id,
                work: ChunkWork::Verses {
                    start: *first,
                    end: *last,
                },
            })
        })
        .collect())
}
