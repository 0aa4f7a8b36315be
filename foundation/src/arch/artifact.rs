use std::{collections::BTreeMap, fs, path::Path};

use safetensors::{Dtype, SafeTensors, tensor::TensorView};

use crate::error::{MlErr, Result};

/// A set of named 1-D `f32` tensors stored in the safetensors format.
///
/// Backends ship their prior weights as an artifact and export their fitted (and
/// possibly fine-tuned) weights as one.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Artifact {
    tensors: BTreeMap<String, Vec<f32>>,
}

impl Artifact {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a tensor, replacing any previous one with the same name.
    pub fn insert<S: Into<String>>(&mut self, name: S, values: Vec<f32>) {
        self.tensors.insert(name.into(), values);
    }

    pub fn get(&self, name: &str) -> Option<&[f32]> {
        self.tensors.get(name).map(Vec::as_slice)
    }

    /// Like [`Artifact::get`] but checks the length when the tensor is present.
    ///
    /// # Errors
    /// `InvalidArtifact` if the tensor exists with another length.
    pub fn get_sized(&self, name: &str, len: usize) -> Result<Option<&[f32]>> {
        match self.get(name) {
            Some(values) if values.len() != len => Err(MlErr::InvalidArtifact(format!(
                "tensor '{name}' has {} values, expected {len}",
                values.len()
            ))),
            found => Ok(found),
        }
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.tensors.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.tensors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tensors.is_empty()
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let views = self
            .tensors
            .iter()
            .map(|(name, values)| {
                let bytes: &[u8] = bytemuck::cast_slice(values);
                Ok((name, TensorView::new(Dtype::F32, vec![values.len()], bytes)?))
            })
            .collect::<Result<BTreeMap<_, _>>>()?;

        Ok(safetensors::tensor::serialize(&views, &None)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let tensors = SafeTensors::deserialize(bytes)?;
        let mut artifact = Self::new();

        for (name, view) in tensors.tensors() {
            if view.dtype() != Dtype::F32 {
                return Err(MlErr::InvalidArtifact(format!(
                    "tensor '{name}' is {:?}, only F32 is supported",
                    view.dtype()
                )));
            }

            let values = view
                .data()
                .chunks_exact(4)
                .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
                .collect();
            artifact.insert(name, values);
        }

        Ok(artifact)
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        fs::write(path, self.to_bytes()?)?;
        Ok(())
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::from_bytes(&fs::read(path)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn survives_the_file_system() {
        let mut artifact = Artifact::new();
        artifact.insert("log_temperature", vec![-2.3]);
        artifact.insert("log_scales", vec![0.0, 0.5, -0.5]);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mitra.safetensors");
        artifact.save(&path).unwrap();

        let loaded = Artifact::load(&path).unwrap();
        assert_eq!(loaded, artifact);
        assert_eq!(
            loaded.names().collect::<Vec<_>>(),
            ["log_scales", "log_temperature"]
        );
    }

    #[test]
    fn checks_lengths() {
        let mut artifact = Artifact::new();
        artifact.insert("gates", vec![1.0, 2.0]);
        assert_eq!(artifact.get_sized("gates", 2).unwrap(), Some(&[1.0, 2.0][..]));
        assert_eq!(artifact.get_sized("missing", 2).unwrap(), None);
        assert!(matches!(
            artifact.get_sized("gates", 3),
            Err(MlErr::InvalidArtifact(_))
        ));
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(matches!(
            Artifact::from_bytes(b"definitely not safetensors"),
            Err(MlErr::InvalidArtifact(_))
        ));
    }
}
