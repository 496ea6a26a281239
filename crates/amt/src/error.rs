// SPDX-License-Identifier: Apache-2.0

//! Re-exports the lower layers' error enums under one name so a caller of
//! the facade only needs to match on a single type.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Tree(#[from] amt_tree::TreeError),

    #[error(transparent)]
    Proof(#[from] amt_proof::ProofError),
}
