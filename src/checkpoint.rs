use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::state::StateDict;
use crate::traits::{Model, Optimizer};

/// What is persisted for a resumable run (gzipped JSON on disk)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub epoch: usize,
    pub eval_loss: f32,
    pub state_dict: StateDict,
    pub optimizer: StateDict,
}

impl Checkpoint {
    /// Overwrites `path`, creating parent directories
    pub fn write(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let json = serde_json::to_vec(self)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = File::create(path)?;
        let mut enc = GzEncoder::new(file, Compression::default());
        enc.write_all(&json)?;
        enc.finish()?;
        Ok(())
    }

    pub fn read(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path)?;
        let mut dec = GzDecoder::new(file);
        let mut buf = Vec::new();
        dec.read_to_end(&mut buf)
            .map_err(|e| Error::Checkpoint(format!("not a gzip checkpoint: {e}")))?;
        serde_json::from_slice(&buf).map_err(|e| Error::Checkpoint(e.to_string()))
    }
}

pub fn save_checkpoint(
    model: &dyn Model,
    optimizer: &dyn Optimizer,
    epoch: usize,
    eval_loss: f32,
    path: impl AsRef<Path>,
) -> Result<()> {
    let path = path.as_ref();
    Checkpoint {
        epoch,
        eval_loss,
        state_dict: model.state_dict(),
        optimizer: optimizer.state_dict(),
    }
    .write(path)?;
    println!("save checkpoint {} epoch {}", path.display(), epoch);
    Ok(())
}

/// Restores model and optimizer in place, returns `(epoch, eval_loss)`.
/// On error neither is changed.
pub fn load_checkpoint(
    model: &mut dyn Model,
    optimizer: &mut dyn Optimizer,
    path: impl AsRef<Path>,
) -> Result<(usize, f32)> {
    let path = path.as_ref();
    let checkpoint = Checkpoint::read(path)?;

    let previous = model.state_dict();
    model.load_state_dict(&checkpoint.state_dict)?;
    if let Err(e) = optimizer.load_state_dict(&checkpoint.optimizer) {
        model.load_state_dict(&previous)?;
        return Err(e);
    }

    println!(
        "=> loaded checkpoint {} epoch {} best eval loss {}",
        path.display(),
        checkpoint.epoch,
        checkpoint.eval_loss
    );
    Ok((checkpoint.epoch, checkpoint.eval_loss))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nn::Mlp;
    use crate::optimizer::{GradientDescent, OptimizerType};

    #[test]
    fn save_then_load() {
        fastrand::seed(4);
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/dir/model.ckpt");

        let model = Mlp::new(&[3, 4, 2]);
        let opt = GradientDescent::new(OptimizerType::adam(), 0.003);
        save_checkpoint(&model, &opt, 7, 0.25, &path).unwrap();

        let mut other = Mlp::new(&[3, 4, 2]);
        let mut other_opt = GradientDescent::new(OptimizerType::adam(), 0.1);
        let (epoch, loss) = load_checkpoint(&mut other, &mut other_opt, &path).unwrap();
        assert_eq!((epoch, loss), (7, 0.25));
        assert_eq!(other.get_weights(), model.get_weights());
        assert_eq!(other_opt.learning_rate(), 0.003);
    }

    #[test]
    fn missing_file_is_io() {
        let mut model = Mlp::new(&[2, 2]);
        let mut opt = GradientDescent::new(OptimizerType::Sgd, 0.1);
        let res = load_checkpoint(&mut model, &mut opt, "no/such/checkpoint");
        assert!(matches!(res, Err(Error::Io(_))));
    }

    #[test]
    fn corrupt_file_is_checkpoint_error() {
        let file = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(file.path(), b"definitely not gzip").unwrap();
        assert!(matches!(
            Checkpoint::read(file.path()),
            Err(Error::Checkpoint(_))
        ));
    }

    #[test]
    fn failed_optimizer_restore_leaves_model_alone() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("m.ckpt");
        fastrand::seed(9);
        let saved = Mlp::new(&[2, 3, 2]);
        let sgd = GradientDescent::new(OptimizerType::Sgd, 0.1);
        save_checkpoint(&saved, &sgd, 1, 1.0, &path).unwrap();

        let mut model = Mlp::new(&[2, 3, 2]);
        let before = model.get_weights();
        let mut adam = GradientDescent::new(OptimizerType::adam(), 0.1);
        assert!(load_checkpoint(&mut model, &mut adam, &path).is_err());
        assert_eq!(model.get_weights(), before);
    }
}
