//! Mises plasticity with linear isotropic and kinematic hardening.
//!
//! Radial-return mapping: the trial stress is computed elastically from
//! the committed plastic strain, the yield condition
//! f = ||dev(sigma) - beta|| - sqrt(2/3) (sigma_y + H_iso kappa)
//! is checked, and on yielding the plastic multiplier follows in closed
//! form from the linear hardening moduli. The returned tangent is the
//! algorithmically consistent one, so Newton iterations converge
//! quadratically.
//!
//! Implemented for 1D and 3D. The plane-strain return mapping is not
//! implemented; evaluating in 2D is a typed error.

use crate::error::{ConstitutiveError, Result};
use crate::io::{Dimension, InputMap, OutputMap, OutputTag, ParameterId};
use crate::static_data::MisesHistory;
use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

/// Mises plasticity law.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MisesPlasticity {
    pub youngs_modulus: f64,
    pub poisson_ratio: f64,
    pub initial_yield_strength: f64,
    pub isotropic_hardening_modulus: f64,
    pub kinematic_hardening_modulus: f64,
    pub density: f64,
}

impl MisesPlasticity {
    pub fn new(youngs_modulus: f64, poisson_ratio: f64, initial_yield_strength: f64) -> Self {
        Self {
            youngs_modulus,
            poisson_ratio,
            initial_yield_strength,
            isotropic_hardening_modulus: 0.0,
            kinematic_hardening_modulus: 0.0,
            density: 0.0,
        }
    }

    pub fn with_isotropic_hardening(mut self, modulus: f64) -> Self {
        self.isotropic_hardening_modulus = modulus;
        self
    }

    pub fn with_kinematic_hardening(mut self, modulus: f64) -> Self {
        self.kinematic_hardening_modulus = modulus;
        self
    }

    fn shear_modulus(&self) -> f64 {
        self.youngs_modulus / (2.0 * (1.0 + self.poisson_ratio))
    }

    fn bulk_modulus(&self) -> f64 {
        self.youngs_modulus / (3.0 * (1.0 - 2.0 * self.poisson_ratio))
    }

    pub(crate) fn evaluate(
        &self,
        dimension: Dimension,
        inputs: &InputMap,
        outputs: &mut OutputMap,
        history: &MisesHistory,
    ) -> Result<MisesHistory> {
        let needs_stress = outputs.contains(OutputTag::EngineeringStress);
        let needs_tangent = outputs.contains(OutputTag::DStressDStrain);
        if !needs_stress && !needs_tangent {
            return Ok(history.clone());
        }
        let strain = inputs.strain(dimension)?;
        match dimension {
            Dimension::D1 => self.return_mapping_1d(strain, outputs, history),
            Dimension::D3 => self.return_mapping_3d(strain, outputs, history),
            Dimension::D2 => Err(ConstitutiveError::NotImplemented {
                law: "MisesPlasticity",
                dimension: 2,
            }),
        }
    }

    fn return_mapping_1d(
        &self,
        strain: &DVector<f64>,
        outputs: &mut OutputMap,
        history: &MisesHistory,
    ) -> Result<MisesHistory> {
        let e = self.youngs_modulus;
        let h_iso = self.isotropic_hardening_modulus;
        let h_kin = self.kinematic_hardening_modulus;

        let stress_trial = e * (strain[0] - history.plastic_strain[0]);
        let relative = stress_trial - history.back_stress[0];
        let yield_value = relative.abs()
            - (self.initial_yield_strength + h_iso * history.accumulated_plastic_strain);

        let mut new = history.clone();
        let (stress, tangent) = if yield_value > 0.0 {
            let sign = relative.signum();
            let delta_lambda = yield_value / (e + h_iso + h_kin);
            new.plastic_strain[0] += delta_lambda * sign;
            new.back_stress[0] += h_kin * delta_lambda * sign;
            new.accumulated_plastic_strain += delta_lambda;
            let stress = stress_trial - e * delta_lambda * sign;
            let tangent = e * (h_iso + h_kin) / (e + h_iso + h_kin);
            (stress, tangent)
        } else {
            (stress_trial, e)
        };

        outputs.set_vector(OutputTag::EngineeringStress, DVector::from_element(1, stress));
        outputs.set_matrix(OutputTag::DStressDStrain, DMatrix::from_element(1, 1, tangent));
        Ok(new)
    }

    fn return_mapping_3d(
        &self,
        strain: &DVector<f64>,
        outputs: &mut OutputMap,
        history: &MisesHistory,
    ) -> Result<MisesHistory> {
        let g = self.shear_modulus();
        let k = self.bulk_modulus();
        let h_iso = self.isotropic_hardening_modulus;
        let h_kin = self.kinematic_hardening_modulus;

        // elastic strain in tensor components (engineering shears halved)
        let mut eps_e = strain - &history.plastic_strain;
        for i in 3..6 {
            eps_e[i] *= 0.5;
        }
        let volumetric = eps_e[0] + eps_e[1] + eps_e[2];

        // trial stress: pressure plus deviatoric part
        let mut stress_trial = DVector::zeros(6);
        for i in 0..3 {
            stress_trial[i] = k * volumetric + 2.0 * g * (eps_e[i] - volumetric / 3.0);
        }
        for i in 3..6 {
            stress_trial[i] = 2.0 * g * eps_e[i];
        }

        // relative deviatoric stress xi = dev(sigma_trial) - back stress
        let pressure = (stress_trial[0] + stress_trial[1] + stress_trial[2]) / 3.0;
        let mut xi = stress_trial.clone();
        for i in 0..3 {
            xi[i] -= pressure;
        }
        xi -= &history.back_stress;

        // tensor norm, shear components appear twice in the tensor
        let norm_xi = (xi.rows(0, 3).norm_squared() + 2.0 * xi.rows(3, 3).norm_squared()).sqrt();
        let yield_radius = (2.0_f64 / 3.0).sqrt()
            * (self.initial_yield_strength + h_iso * history.accumulated_plastic_strain);
        let yield_value = norm_xi - yield_radius;

        let mut new = history.clone();
        if yield_value <= 0.0 || norm_xi == 0.0 {
            outputs.set_vector(OutputTag::EngineeringStress, stress_trial);
            outputs.set_matrix(OutputTag::DStressDStrain, self.elastic_stiffness());
            return Ok(new);
        }

        let delta_gamma = yield_value / (2.0 * g + 2.0 / 3.0 * (h_iso + h_kin));
        let normal = &xi / norm_xi;

        let mut stress = stress_trial;
        stress -= &(&normal * (2.0 * g * delta_gamma));
        for i in 0..3 {
            new.plastic_strain[i] += delta_gamma * normal[i];
        }
        for i in 3..6 {
            // engineering shear, twice the tensor component
            new.plastic_strain[i] += 2.0 * delta_gamma * normal[i];
        }
        new.back_stress += &(&normal * (2.0 / 3.0 * h_kin * delta_gamma));
        new.accumulated_plastic_strain += (2.0_f64 / 3.0).sqrt() * delta_gamma;

        outputs.set_vector(OutputTag::EngineeringStress, stress);
        outputs.set_matrix(
            OutputTag::DStressDStrain,
            self.consistent_tangent(&normal, norm_xi, delta_gamma),
        );
        Ok(new)
    }

    /// Elastic stiffness K 1x1 + 2G P, engineering Voigt notation.
    fn elastic_stiffness(&self) -> DMatrix<f64> {
        let g = self.shear_modulus();
        let k = self.bulk_modulus();
        let mut m = DMatrix::zeros(6, 6);
        for i in 0..3 {
            for j in 0..3 {
                m[(i, j)] = k + 2.0 * g * (if i == j { 2.0 / 3.0 } else { -1.0 / 3.0 });
            }
            m[(i + 3, i + 3)] = g;
        }
        m
    }

    /// Algorithmically consistent tangent of the radial return,
    /// D = K 1x1 + 2G theta P - 2G theta_bar n (x) n.
    fn consistent_tangent(
        &self,
        normal: &DVector<f64>,
        norm_xi: f64,
        delta_gamma: f64,
    ) -> DMatrix<f64> {
        let g = self.shear_modulus();
        let k = self.bulk_modulus();
        let h = self.isotropic_hardening_modulus + self.kinematic_hardening_modulus;

        let theta = 1.0 - 2.0 * g * delta_gamma / norm_xi;
        let theta_bar = 1.0 / (1.0 + h / (3.0 * g)) - (1.0 - theta);

        let mut m = DMatrix::zeros(6, 6);
        for i in 0..3 {
            for j in 0..3 {
                m[(i, j)] =
                    k + 2.0 * g * theta * (if i == j { 2.0 / 3.0 } else { -1.0 / 3.0 });
            }
            m[(i + 3, i + 3)] = g * theta;
        }
        for i in 0..6 {
            for j in 0..6 {
                m[(i, j)] -= 2.0 * g * theta_bar * normal[i] * normal[j];
            }
        }
        m
    }

    pub(crate) fn parameter(&self, id: ParameterId) -> Result<f64> {
        match id {
            ParameterId::YoungsModulus => Ok(self.youngs_modulus),
            ParameterId::PoissonRatio => Ok(self.poisson_ratio),
            ParameterId::Density => Ok(self.density),
            ParameterId::InitialYieldStrength => Ok(self.initial_yield_strength),
            ParameterId::IsotropicHardeningModulus => Ok(self.isotropic_hardening_modulus),
            ParameterId::KinematicHardeningModulus => Ok(self.kinematic_hardening_modulus),
            _ => Err(ConstitutiveError::UnknownParameter(id, "MisesPlasticity")),
        }
    }

    pub(crate) fn set_parameter(&mut self, id: ParameterId, value: f64) -> Result<()> {
        match id {
            ParameterId::YoungsModulus => self.youngs_modulus = value,
            ParameterId::PoissonRatio => self.poisson_ratio = value,
            ParameterId::Density => self.density = value,
            ParameterId::InitialYieldStrength => self.initial_yield_strength = value,
            ParameterId::IsotropicHardeningModulus => self.isotropic_hardening_modulus = value,
            ParameterId::KinematicHardeningModulus => self.kinematic_hardening_modulus = value,
            _ => return Err(ConstitutiveError::UnknownParameter(id, "MisesPlasticity")),
        }
        Ok(())
    }
}
