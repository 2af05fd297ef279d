//! Generalized Advantage Estimation (GAE)
//!
//! The recursion runs backward in time, independently per instance:
//!
//! ```text
//! δ_t = r_t + γ * V_{t+1} * (1 - done_t) - V_t
//! A_t = δ_t + γ * λ * (1 - done_t) * A_{t+1}
//! R_t = A_t + V_t
//! ```
//!
//! `V_T` is the bootstrap value and `A_T = 0`. A `done` at step `t` means the
//! reward at `t` was the last of its episode, so neither the next value nor
//! the next advantage leaks back across the boundary.

/// Output slices written by [`compute_gae`], each `[num_steps * num_envs]`
pub struct GaeOutput<'a> {
    /// TD residuals
    pub deltas: &'a mut [f32],

    /// Advantage estimates
    pub advantages: &'a mut [f32],

    /// Discounted return targets
    pub returns: &'a mut [f32],
}

/// Compute residuals, advantages and returns over a step-major window
///
/// # Arguments
/// * `rewards` - `[num_steps * num_envs]`
/// * `values` - `[(num_steps + 1) * num_envs]`, last row is the bootstrap
/// * `dones` - `[num_steps * num_envs]`
/// * `num_envs` - Instances per step
/// * `gamma` - Discount factor
/// * `lam` - GAE lambda parameter
pub fn compute_gae(
    rewards: &[f32],
    values: &[f32],
    dones: &[bool],
    num_envs: usize,
    gamma: f32,
    lam: f32,
    out: GaeOutput<'_>,
) {
    let cells = rewards.len();
    debug_assert_eq!(cells % num_envs, 0, "rewards not a whole number of steps");
    debug_assert_eq!(values.len(), cells + num_envs, "values must include the bootstrap row");
    debug_assert_eq!(dones.len(), cells);
    let num_steps = cells / num_envs;

    let mut next_advantage = vec![0.0f32; num_envs];
    for step in (0..num_steps).rev() {
        for (env, carry) in next_advantage.iter_mut().enumerate() {
            let i = step * num_envs + env;
            let not_done = if dones[i] { 0.0 } else { 1.0 };
            let next_value = values[i + num_envs];

            let delta = rewards[i] + gamma * next_value * not_done - values[i];
            let advantage = delta + gamma * lam * not_done * *carry;

            out.deltas[i] = delta;
            out.advantages[i] = advantage;
            out.returns[i] = advantage + values[i];
            *carry = advantage;
        }
    }
}

/// GAE for a single instance's trajectory
///
/// Same recursion as [`compute_gae`] with `num_envs == 1` and the bootstrap
/// value passed separately. Returns `(advantages, returns)`.
pub fn gae_single_env(
    rewards: &[f32],
    values: &[f32],
    dones: &[bool],
    bootstrap_value: f32,
    gamma: f32,
    lam: f32,
) -> (Vec<f32>, Vec<f32>) {
    let n = rewards.len();
    assert_eq!(values.len(), n, "values length mismatch");
    assert_eq!(dones.len(), n, "dones length mismatch");

    let mut extended = Vec::with_capacity(n + 1);
    extended.extend_from_slice(values);
    extended.push(bootstrap_value);

    let mut deltas = vec![0.0; n];
    let mut advantages = vec![0.0; n];
    let mut returns = vec![0.0; n];
    compute_gae(
        rewards,
        &extended,
        dones,
        1,
        gamma,
        lam,
        GaeOutput { deltas: &mut deltas, advantages: &mut advantages, returns: &mut returns },
    );
    (advantages, returns)
}

/// Standardize advantages in place: `(A - mean) / (std + 1e-9)`
///
/// Uses the population standard deviation. A single-element slice becomes 0.
pub fn normalize_advantages(advantages: &mut [f32]) {
    if advantages.is_empty() {
        return;
    }

    let n = advantages.len() as f64;
    let mean = advantages.iter().map(|&a| a as f64).sum::<f64>() / n;
    let var = advantages.iter().map(|&a| (a as f64 - mean).powi(2)).sum::<f64>() / n;
    let std = var.sqrt();

    for a in advantages.iter_mut() {
        *a = ((*a as f64 - mean) / (std + 1e-9)) as f32;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_cuts_bootstrap() {
        let (adv, ret) = gae_single_env(&[1.0, 1.0], &[0.0, 0.0], &[false, true], 100.0, 0.99, 0.95);
        assert_eq!(adv[1], 1.0);
        assert!((adv[0] - (1.0 + 0.99 * 0.95)).abs() < 1e-6);
        assert_eq!(ret, adv);
    }

    #[test]
    fn test_bootstrap_value_used_when_not_done() {
        let (adv, _) = gae_single_env(&[0.0], &[0.0], &[false], 2.0, 0.5, 0.95);
        assert!((adv[0] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_lambda_one_gives_discounted_return() {
        let rewards = [1.0, 2.0, 3.0];
        let values = [0.5, -0.5, 0.25];
        let gamma = 0.9;
        let (adv, ret) = gae_single_env(&rewards, &values, &[false; 3], 0.0, gamma, 1.0);

        let expected_r0 = 1.0 + gamma * 2.0 + gamma * gamma * 3.0;
        assert!((ret[0] - expected_r0).abs() < 1e-5);
        assert!((adv[0] - (expected_r0 - 0.5)).abs() < 1e-5);
    }

    #[test]
    fn test_instances_are_independent() {
        // Two instances interleaved step-major; env 1 terminates at step 0
        let rewards = [1.0, 5.0, 1.0, 5.0];
        let values = [0.0, 0.0, 0.0, 0.0, 0.0, 0.0];
        let dones = [false, true, false, false];
        let mut deltas = [0.0; 4];
        let mut advantages = [0.0; 4];
        let mut returns = [0.0; 4];
        compute_gae(
            &rewards,
            &values,
            &dones,
            2,
            0.99,
            0.95,
            GaeOutput { deltas: &mut deltas, advantages: &mut advantages, returns: &mut returns },
        );

        let (env0, _) = gae_single_env(&[1.0, 1.0], &[0.0, 0.0], &[false, false], 0.0, 0.99, 0.95);
        assert_eq!(advantages[0], env0[0]);
        assert_eq!(advantages[2], env0[1]);
        assert_eq!(advantages[1], 5.0);
        assert_eq!(deltas[3], 5.0);
    }

    #[test]
    fn test_normalize_advantages() {
        let mut adv = [1.0, 2.0, 3.0, 4.0];
        normalize_advantages(&mut adv);

        let mean: f32 = adv.iter().sum::<f32>() / 4.0;
        let var: f32 = adv.iter().map(|a| (a - mean).powi(2)).sum::<f32>() / 4.0;
        assert!(mean.abs() < 1e-6);
        assert!((var - 1.0).abs() < 1e-4);
    }

    #[test]
    fn test_normalize_constant_is_zero() {
        let mut adv = [3.0; 5];
        normalize_advantages(&mut adv);
        assert!(adv.iter().all(|&a| a == 0.0));
    }
}
