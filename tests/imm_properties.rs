//! Integration tests for the IMM recursion

mod common;

use common::{
    assert_valid_covariance, assert_valid_state, make_measurement, make_parameters,
    straight_line_measurements,
};
use immtrack::imm::mixing::{mix_estimates, mixing_normalizers};
use immtrack::imm::probability::update_mode_probabilities;
use immtrack::imm::{ImmEstimator, ImmParameters, InitialStatePrior, ModeTransitionMatrix};
use immtrack::models::MotionMode;
use immtrack::scenario::{generate_bundle, ScenarioConfig};
use immtrack::ImmError;

#[test]
fn test_mode_probabilities_stay_normalized() {
    let bundle = generate_bundle(&ScenarioConfig::maneuvering(60, 1, 5)).unwrap();
    let mut imm = ImmEstimator::new(bundle.parameters().unwrap()).unwrap();

    for (k, z) in bundle.realizations[0].measurement_vectors().iter().enumerate() {
        let out = imm.step(z).unwrap();
        let total: f64 = out.mode_probabilities.iter().sum();

        assert!((total - 1.0).abs() < 1e-9, "Step {}: mu sums to {}", k, total);
        for &p in &out.mode_probabilities {
            assert!((0.0..=1.0).contains(&p), "Step {}: mu entry {}", k, p);
        }
    }
}

#[test]
fn test_covariances_remain_valid() {
    let bundle = generate_bundle(&ScenarioConfig::maneuvering(60, 1, 9)).unwrap();
    let mut imm = ImmEstimator::new(bundle.parameters().unwrap()).unwrap();

    for (k, z) in bundle.realizations[0].measurement_vectors().iter().enumerate() {
        let out = imm.step(z).unwrap();
        assert_valid_state(&out.estimate, &format!("combined, step {}", k));

        for record in imm.bank() {
            assert_valid_state(&record.estimate, &format!("{}, step {}", record.mode, k));
            assert_valid_covariance(
                &record.predicted.covariance,
                &format!("{} predicted, step {}", record.mode, k),
            );
        }

        let estimates = [imm.bank()[0].estimate.clone(), imm.bank()[1].estimate.clone()];
        let mixed = mix_estimates(&estimates, &imm.params().transition, imm.mode_probabilities());
        for (j, initial) in mixed.initial.iter().enumerate() {
            assert_valid_covariance(&initial.covariance, &format!("mixed {}, step {}", j, k));
        }
    }
}

#[test]
fn test_cv_favouring_likelihoods_drive_mu_to_cv() {
    let identity = ModeTransitionMatrix::<f64>::identity();
    let mut mu = [0.5, 0.5];

    for _ in 0..10 {
        let c_bar = mixing_normalizers(&identity, &mu);
        mu = update_mode_probabilities(&[0.4, 0.05], &c_bar);
    }

    assert!(mu[0] > 0.999, "mu_CV = {}", mu[0]);
    assert!(mu[1] < 1e-3, "mu_CT = {}", mu[1]);
}

#[test]
fn test_equal_likelihoods_keep_predicted_probabilities() {
    let transition = ModeTransitionMatrix::from_rows([[0.9_f64, 0.1], [0.3, 0.7]]).unwrap();
    let mu = [0.25_f64, 0.75];
    let c_bar = mixing_normalizers(&transition, &mu);

    // c_bar = [0.9 * 0.25 + 0.3 * 0.75, 0.1 * 0.25 + 0.7 * 0.75]
    assert!((c_bar[0] - 0.45).abs() < 1e-12);
    assert!((c_bar[1] - 0.55).abs() < 1e-12);

    let updated = update_mode_probabilities(&[1e-3, 1e-3], &c_bar);
    assert!((updated[0] - 0.45).abs() < 1e-12);
    assert!((updated[1] - 0.55).abs() < 1e-12);
}

#[test]
fn test_converges_with_vanishing_noise() {
    let params = ImmParameters::new(
        1.0,
        ModeTransitionMatrix::sticky(0.95).unwrap(),
        nalgebra::matrix![1e-8, 0.0; 0.0, 1e-8],
        nalgebra::matrix![1e-6, 0.0; 0.0, 1e-6],
        InitialStatePrior::from_moments([3.0, -2.0], [0.0, 0.0], 0.0, 10.0, 10.0, 0.01),
    )
    .with_turn_rate_variance(1e-8);
    let mut imm = ImmEstimator::new(params).unwrap();

    let velocity = [2.0, 0.5];
    let measurements = straight_line_measurements([5.0, -3.0], velocity, 1.0, 20);
    let outputs = imm.run(&measurements).unwrap();

    for (k, out) in outputs.iter().enumerate().skip(15) {
        let t = (k + 1) as f64;
        let mean = out.estimate.mean;
        assert!((mean.index(0) - (5.0 + 2.0 * t)).abs() < 1e-3, "Step {}: x = {}", k, mean.index(0));
        assert!((mean.index(2) - (-3.0 + 0.5 * t)).abs() < 1e-3, "Step {}: y = {}", k, mean.index(2));
        assert!((mean.index(1) - velocity[0]).abs() < 1e-2, "Step {}: vx = {}", k, mean.index(1));
        assert!((mean.index(3) - velocity[1]).abs() < 1e-2, "Step {}: vy = {}", k, mean.index(3));
    }
}

#[test]
fn test_turn_is_detected() {
    let config = ScenarioConfig::maneuvering(90, 1, 21);
    let bundle = generate_bundle(&config).unwrap();
    let mut imm = ImmEstimator::new(bundle.parameters().unwrap()).unwrap();
    let outputs = imm
        .run(&bundle.realizations[0].measurement_vectors())
        .unwrap();

    let ct = MotionMode::ConstantTurn.index();
    let mean_mu_ct = |range: std::ops::Range<usize>| {
        let n = range.len() as f64;
        range.map(|k| outputs[k].mode_probabilities[ct]).sum::<f64>() / n
    };
    let straight = mean_mu_ct(15..30);
    let turning = mean_mu_ct(45..60);
    assert!(turning > straight, "mu_CT straight {} vs turning {}", straight, turning);

    let turn_rate: f64 = (45..60).map(|k| outputs[k].ct_turn_rate()).sum::<f64>() / 15.0;
    assert!(turn_rate > 0.03, "CT turn rate during the turn: {}", turn_rate);
}

#[test]
fn test_step_counter_and_reset() {
    let mut imm = ImmEstimator::new(make_parameters(0.1, 1.0)).unwrap();
    let measurements = straight_line_measurements([0.0, 0.0], [1.0, 1.0], 1.0, 4);

    let first = imm.run(&measurements).unwrap();
    assert_eq!(first.last().unwrap().step, 3);

    imm.reset();
    let second = imm.run(&measurements).unwrap();
    assert_eq!(first, second);
}

#[test]
fn test_unknown_mode_index_is_an_error() {
    let imm = ImmEstimator::new(make_parameters(0.1, 1.0)).unwrap();
    assert_eq!(MotionMode::from_index(2), Err(ImmError::UnknownMode { index: 2 }));
    assert!(matches!(imm.mode_state(3), Err(ImmError::UnknownMode { index: 3 })));
}

#[test]
fn test_large_innovation_is_floored_not_fatal() {
    let params = make_parameters(1e-4, 1e-4).with_likelihood_floor(1e-200);
    let mut imm = ImmEstimator::new(params).unwrap();
    for z in straight_line_measurements([0.0, 0.0], [1.0, 0.0], 1.0, 10) {
        imm.step(&z).unwrap();
    }

    let out = imm.step(&make_measurement(1e6, -1e6)).unwrap();
    assert!(out.likelihoods.iter().all(|l| l.floored));
    assert!(out.likelihoods.iter().all(|l| l.value >= 1e-200));
    let total: f64 = out.mode_probabilities.iter().sum();
    assert!((total - 1.0).abs() < 1e-9);
}
