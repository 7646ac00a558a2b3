use chrono::{DateTime, Local};
use rand::Rng;
use serde::{Deserialize, Deserializer, Serialize};

/// Length of the latent vector the synthesis service expects.
pub const NR_OF_VECTOR_VALUES: usize = 100;

/// The synthesis service's default latent vector.
pub const DEFAULT_VECTOR: [f32; NR_OF_VECTOR_VALUES] = [
    0.58732957, 0.6972805, 0.15056181, 0.53952605, 0.91790676,
    0.09049249, 0.44609421, 0.8221859, 0.08961606, 0.010547042,
    0.54972273, 0.21401787, 0.7587384, 0.7761831, 0.07989895,
    0.5466561, 0.52544266, 0.30940408, 0.4564435, 0.8913878,
    0.6853374, 0.26354033, 0.6475786, 0.52856654, 0.49651593,
    0.16272902, 0.44675475, 0.9146943, 0.8198675, 0.24936414,
    0.1530689, 0.272052, 0.027986646, 0.991868, 0.5375275,
    0.11260021, 0.13893759, 0.30683833, 0.34935182, 0.7850461,
    0.89308524, 0.9087535, 0.090803266, 0.36241537, 0.07586753,
    0.24077547, 0.099396825, 0.6321522, 0.82677186, 0.3967114,
    0.6207859, 0.9525721, 0.879763, 0.16294241, 0.60554093,
    0.76912594, 0.9842056, 0.90315795, 0.24763906, 0.22670293,
    0.42008668, 0.297, 0.58714324, 0.9200939, 0.34477907,
    0.5504177, 0.6503407, 0.20036387, 0.27298683, 0.75208604,
    0.3533005, 0.39472228, 0.9028208, 0.8310498, 0.7190037,
    0.6799555, 0.37569577, 0.6911589, 0.66053295, 0.036450982,
    0.14664078, 0.7068013, 0.42486876, 0.9640188, 0.94952524,
    0.40467983, 0.9711131, 0.46378106, 0.306091, 0.53330976,
    0.8943504, 0.27032512, 0.48487574, 0.20658743, 0.65024304,
    0.62318295, 0.34946483, 0.46808404, 0.1760987, 0.66087484,
];

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DefinitionError {
    #[error("vector index {index} out of range (0..{})", NR_OF_VECTOR_VALUES)]
    IndexOutOfRange { index: usize },

    #[error("expected {} vector values, got {len}", NR_OF_VECTOR_VALUES)]
    VectorLength { len: usize },
}

/// A named point in the synthesis service's latent space.
///
/// The vector always holds exactly [`NR_OF_VECTOR_VALUES`] values in `[0, 1]`;
/// every mutation refreshes `creation_date`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SampleDefinition {
    pub name: String,
    pub creation_date: DateTime<Local>,
    #[serde(alias = "_vectorValues", deserialize_with = "vector_or_default")]
    vector_values: Vec<f32>,
}

impl SampleDefinition {
    /// Build a definition from `values`. A vector of the wrong length is
    /// replaced by [`DEFAULT_VECTOR`].
    pub fn new(values: Vec<f32>, name: impl Into<String>) -> Self {
        let name = name.into();
        let vector_values = if values.len() == NR_OF_VECTOR_VALUES {
            values.into_iter().map(clamp_unit).collect()
        } else {
            log::warn!(
                "sample definition '{name}' built from {} values, using the default vector",
                values.len()
            );
            DEFAULT_VECTOR.to_vec()
        };
        Self {
            name,
            creation_date: Local::now(),
            vector_values,
        }
    }

    pub fn with_default_vector(name: impl Into<String>) -> Self {
        Self::new(DEFAULT_VECTOR.to_vec(), name)
    }

    /// Uniformly random values in `[0, 1)`.
    pub fn random(name: impl Into<String>) -> Self {
        let mut rng = rand::rng();
        let values = (0..NR_OF_VECTOR_VALUES)
            .map(|_| rng.random_range(0.0..1.0))
            .collect();
        Self::new(values, name)
    }

    pub fn vector_values(&self) -> &[f32] {
        &self.vector_values
    }

    pub fn update_value(&mut self, index: usize, value: f32) -> Result<(), DefinitionError> {
        let slot = self
            .vector_values
            .get_mut(index)
            .ok_or(DefinitionError::IndexOutOfRange { index })?;
        *slot = clamp_unit(value);
        self.creation_date = Local::now();
        Ok(())
    }

    pub fn update_values(&mut self, values: &[f32]) -> Result<(), DefinitionError> {
        if values.len() != NR_OF_VECTOR_VALUES {
            return Err(DefinitionError::VectorLength { len: values.len() });
        }
        for (slot, value) in self.vector_values.iter_mut().zip(values) {
            *slot = clamp_unit(*value);
        }
        self.creation_date = Local::now();
        Ok(())
    }
}

impl Default for SampleDefinition {
    fn default() -> Self {
        Self::with_default_vector("defaultSample")
    }
}

fn clamp_unit(value: f32) -> f32 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

fn vector_or_default<'de, D>(deserializer: D) -> Result<Vec<f32>, D::Error>
where
    D: Deserializer<'de>,
{
    let values = Vec::<f32>::deserialize(deserializer)?;
    if values.len() == NR_OF_VECTOR_VALUES {
        Ok(values.into_iter().map(clamp_unit).collect())
    } else {
        log::warn!(
            "stored sample definition has {} values, using the default vector",
            values.len()
        );
        Ok(DEFAULT_VECTOR.to_vec())
    }
}
