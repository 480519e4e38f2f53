use crate::{focus::FocusError, hologram::HologramError};

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("Error in the `hologram` module")]
    Hologram(#[from] HologramError),
    #[error("Error in the `focus` module")]
    Focus(#[from] FocusError),
}
