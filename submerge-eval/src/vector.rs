// Nearest-neighbor search (spec §4.F, "findNearest").

use submerge_base::{fault, Code, FaultResult};
use submerge_lang::{Flo, Value};

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum DistanceMeasure {
    Euclidean,
    Cosine,
    DotProduct,
}

#[derive(Clone, Debug)]
pub struct FindNearest {
    pub vector_field: String,
    pub query_vector: Vec<f64>,
    pub limit: u32,
    pub distance_measure: DistanceMeasure,
}

impl FindNearest {
    pub fn validate(&self) -> FaultResult<()> {
        if self.limit == 0 || self.limit > 1000 {
            return Err(fault(
                Code::InvalidArgument,
                "findNearest limit must be between 1 and 1000",
            ));
        }
        Ok(())
    }
}

pub fn distance(measure: DistanceMeasure, a: &[f64], b: &[f64]) -> f64 {
    match measure {
        DistanceMeasure::Euclidean => a
            .iter()
            .zip(b)
            .map(|(x, y)| (x - y).powi(2))
            .sum::<f64>()
            .sqrt(),
        DistanceMeasure::Cosine => {
            let dot: f64 = a.iter().zip(b).map(|(x, y)| x * y).sum();
            let norm_a = a.iter().map(|x| x * x).sum::<f64>().sqrt();
            let norm_b = b.iter().map(|x| x * x).sum::<f64>().sqrt();
            if norm_a == 0.0 || norm_b == 0.0 {
                1.0
            } else {
                1.0 - dot / (norm_a * norm_b)
            }
        }
        DistanceMeasure::DotProduct => -a.iter().zip(b).map(|(x, y)| x * y).sum::<f64>(),
    }
}

pub fn as_f64_vector(value: &Value, dimension: usize) -> Option<Vec<f64>> {
    match value {
        Value::Vector(vs) if vs.len() == dimension => Some(vs.iter().map(|v: &Flo| v.into_inner()).collect()),
        _ => None,
    }
}
