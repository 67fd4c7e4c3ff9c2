//! Isotropic linear elasticity.
//!
//! Stress follows Hooke's law, sigma = C : epsilon, with the stiffness
//! assembled from Young's modulus and Poisson's ratio. 2D uses plane
//! strain. The law is stateless.

use crate::error::{ConstitutiveError, Result};
use crate::io::{Dimension, InputMap, OutputMap, OutputTag, ParameterId};
use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};

/// Isotropic linear-elastic law.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearElastic {
    pub youngs_modulus: f64,
    pub poisson_ratio: f64,
    pub density: f64,
}

impl LinearElastic {
    pub fn new(youngs_modulus: f64, poisson_ratio: f64) -> Self {
        Self {
            youngs_modulus,
            poisson_ratio,
            density: 0.0,
        }
    }

    pub fn with_density(mut self, density: f64) -> Self {
        self.density = density;
        self
    }

    /// Stiffness matrix in Voigt notation for engineering strains.
    pub fn stiffness(&self, dimension: Dimension) -> DMatrix<f64> {
        let e = self.youngs_modulus;
        let nu = self.poisson_ratio;
        match dimension {
            Dimension::D1 => DMatrix::from_element(1, 1, e),
            Dimension::D2 => {
                // plane strain
                let c = e / ((1.0 + nu) * (1.0 - 2.0 * nu));
                let mut m = DMatrix::zeros(3, 3);
                m[(0, 0)] = c * (1.0 - nu);
                m[(1, 1)] = c * (1.0 - nu);
                m[(0, 1)] = c * nu;
                m[(1, 0)] = c * nu;
                m[(2, 2)] = c * (1.0 - 2.0 * nu) / 2.0;
                m
            }
            Dimension::D3 => {
                let c = e / ((1.0 + nu) * (1.0 - 2.0 * nu));
                let mut m = DMatrix::zeros(6, 6);
                for i in 0..3 {
                    for j in 0..3 {
                        m[(i, j)] = if i == j { c * (1.0 - nu) } else { c * nu };
                    }
                    m[(i + 3, i + 3)] = c * (1.0 - 2.0 * nu) / 2.0;
                }
                m
            }
        }
    }

    pub(crate) fn evaluate(
        &self,
        dimension: Dimension,
        inputs: &InputMap,
        outputs: &mut OutputMap,
    ) -> Result<()> {
        let needs_stress = outputs.contains(OutputTag::EngineeringStress);
        let needs_tangent = outputs.contains(OutputTag::DStressDStrain);
        if !needs_stress && !needs_tangent {
            return Ok(());
        }

        let stiffness = self.stiffness(dimension);
        if needs_stress {
            let strain = inputs.strain(dimension)?;
            outputs.set_vector(OutputTag::EngineeringStress, &stiffness * strain);
        }
        if needs_tangent {
            outputs.set_matrix(OutputTag::DStressDStrain, stiffness);
        }
        Ok(())
    }

    pub(crate) fn parameter(&self, id: ParameterId) -> Result<f64> {
        match id {
            ParameterId::YoungsModulus => Ok(self.youngs_modulus),
            ParameterId::PoissonRatio => Ok(self.poisson_ratio),
            ParameterId::Density => Ok(self.density),
            _ => Err(ConstitutiveError::UnknownParameter(id, "LinearElastic")),
        }
    }

    pub(crate) fn set_parameter(&mut self, id: ParameterId, value: f64) -> Result<()> {
        match id {
            ParameterId::YoungsModulus => self.youngs_modulus = value,
            ParameterId::PoissonRatio => self.poisson_ratio = value,
            ParameterId::Density => self.density = value,
            _ => return Err(ConstitutiveError::UnknownParameter(id, "LinearElastic")),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::InputTag;
    use approx::assert_relative_eq;
    use nalgebra::DVector;

    #[test]
    fn uniaxial_stress_1d() {
        let law = LinearElastic::new(210e9, 0.3);
        let mut inputs = InputMap::new();
        inputs.insert_vector(InputTag::EngineeringStrain, DVector::from_element(1, 1e-3));
        let mut outputs = OutputMap::new();
        outputs.request(OutputTag::EngineeringStress, Dimension::D1);
        outputs.request(OutputTag::DStressDStrain, Dimension::D1);

        law.evaluate(Dimension::D1, &inputs, &mut outputs).unwrap();
        let stress = outputs
            .slot(OutputTag::EngineeringStress)
            .unwrap()
            .calculated_vector(OutputTag::EngineeringStress)
            .unwrap();
        assert_relative_eq!(stress[0], 210e6, max_relative = 1e-12);
    }

    #[test]
    fn hydrostatic_response_3d() {
        let e = 100.0;
        let nu = 0.25;
        let law = LinearElastic::new(e, nu);
        let mut inputs = InputMap::new();
        let mut strain = DVector::zeros(6);
        strain[0] = 1e-2;
        strain[1] = 1e-2;
        strain[2] = 1e-2;
        inputs.insert_vector(InputTag::EngineeringStrain, strain);
        let mut outputs = OutputMap::new();
        outputs.request(OutputTag::EngineeringStress, Dimension::D3);

        law.evaluate(Dimension::D3, &inputs, &mut outputs).unwrap();
        let stress = outputs
            .slot(OutputTag::EngineeringStress)
            .unwrap()
            .calculated_vector(OutputTag::EngineeringStress)
            .unwrap();
        let bulk = e / (3.0 * (1.0 - 2.0 * nu));
        assert_relative_eq!(stress[0], 3.0 * bulk * 1e-2, max_relative = 1e-12);
        assert_relative_eq!(stress[3], 0.0);
    }

    #[test]
    fn tangent_only_needs_no_strain() {
        let law = LinearElastic::new(100.0, 0.2);
        let inputs = InputMap::new();
        let mut outputs = OutputMap::new();
        outputs.request(OutputTag::DStressDStrain, Dimension::D1);
        law.evaluate(Dimension::D1, &inputs, &mut outputs).unwrap();
        let tangent = outputs
            .slot(OutputTag::DStressDStrain)
            .unwrap()
            .calculated_matrix(OutputTag::DStressDStrain)
            .unwrap();
        assert_eq!(tangent[(0, 0)], 100.0);
    }

    #[test]
    fn unknown_parameter_is_rejected() {
        let law = LinearElastic::new(100.0, 0.2);
        assert!(matches!(
            law.parameter(ParameterId::InitialYieldStrength),
            Err(ConstitutiveError::UnknownParameter(_, _))
        ));
    }
}
