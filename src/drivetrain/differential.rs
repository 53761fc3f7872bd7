// ==============================================================================
// differential.rs — LEFT/RIGHT TORQUE SPLIT FOR ONE DRIVEN AXLE
// ------------------------------------------------------------------------------
//   produced  = received × final_drive
//   slip      = |rpm_l - rpm_r| / (|rpm_l| + |rpm_r|)        (0 when both ~0)
//   bias_l    = Open:       sign(|rpm_l| - |rpm_r|) × slip
//               Limited:    Open × (1 - limited_slip_ratio / 100)
//               FullLocked: sign(|rpm_l| - |rpm_r|) × 0.5
//               Direct:     0
//   bias_r    = -bias_l
//   out_l     = produced / 2 - produced × bias_l
//   out_r     = produced / 2 - produced × bias_r
//
// The faster wheel (by magnitude, so reverse behaves like forward) receives
// less torque. out_l + out_r == produced always.
// ==============================================================================

use serde::{Deserialize, Serialize};

const RPM_EPSILON: f32 = 1e-3;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DifferentialType {
    #[default]
    Open,
    Limited,
    FullLocked,
    Direct,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DifferentialConfig {
    pub kind: DifferentialType,
    pub final_drive: f32,
    pub limited_slip_ratio: f32, // 0..100
}

impl Default for DifferentialConfig {
    fn default() -> Self {
        Self { kind: DifferentialType::Open, final_drive: 4.1, limited_slip_ratio: 80.0 }
    }
}

#[derive(Clone, Debug)]
pub struct Differential {
    config: DifferentialConfig,
    left_rpm: f32,
    right_rpm: f32,
    slip_ratio: f32,
    left_bias: f32,
    right_bias: f32,
    received_torque: f32,
    produced_torque: f32,
    output_left: f32,
    output_right: f32,
}

impl Differential {
    pub fn new(config: DifferentialConfig) -> Self {
        Self {
            config,
            left_rpm: 0.0,
            right_rpm: 0.0,
            slip_ratio: 0.0,
            left_bias: 0.0,
            right_bias: 0.0,
            received_torque: 0.0,
            produced_torque: 0.0,
            output_left: 0.0,
            output_right: 0.0,
        }
    }

    pub fn config(&self) -> &DifferentialConfig { &self.config }
    pub fn final_drive(&self) -> f32 { self.config.final_drive }
    pub fn slip_ratio(&self) -> f32 { self.slip_ratio }
    pub fn biases(&self) -> (f32, f32) { (self.left_bias, self.right_bias) }
    pub fn received_torque(&self) -> f32 { self.received_torque }
    pub fn produced_torque(&self) -> f32 { self.produced_torque }
    pub fn outputs(&self) -> (f32, f32) { (self.output_left, self.output_right) }

    /// Mean wheel rpm seen last split.
    pub fn wheel_rpm(&self) -> f32 {
        (self.left_rpm + self.right_rpm) * 0.5
    }

    pub fn split(&mut self, received: f32, left_rpm: f32, right_rpm: f32) -> (f32, f32) {
        self.left_rpm = if left_rpm.is_finite() { left_rpm } else { 0.0 };
        self.right_rpm = if right_rpm.is_finite() { right_rpm } else { 0.0 };

        let delta = self.left_rpm - self.right_rpm;
        let sum = self.left_rpm.abs() + self.right_rpm.abs();
        self.slip_ratio = if sum > RPM_EPSILON { (delta.abs() / sum).clamp(0.0, 1.0) } else { 0.0 };

        let faster = self.left_rpm.abs() - self.right_rpm.abs();
        let sign = if faster > 0.0 { 1.0 } else if faster < 0.0 { -1.0 } else { 0.0 };
        let open = sign * self.slip_ratio;

        self.left_bias = match self.config.kind {
            DifferentialType::Open => open,
            DifferentialType::Limited => open * (1.0 - self.config.limited_slip_ratio.clamp(0.0, 100.0) / 100.0),
            DifferentialType::FullLocked => sign * 0.5,
            DifferentialType::Direct => 0.0,
        }
        .clamp(-0.5, 0.5);
        self.right_bias = -self.left_bias;

        self.received_torque = received;
        self.produced_torque = received * self.config.final_drive;

        let t = self.produced_torque;
        self.output_left = t * 0.5 - t * self.left_bias;
        self.output_right = t * 0.5 - t * self.right_bias;
        (self.output_left, self.output_right)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rand::{Rng, SeedableRng, rngs::StdRng};

    fn diff(kind: DifferentialType) -> Differential {
        Differential::new(DifferentialConfig { kind, final_drive: 4.0, limited_slip_ratio: 50.0 })
    }

    #[test]
    fn locked_and_direct_conserve_torque() {
        let mut rng = StdRng::seed_from_u64(11);
        for kind in [DifferentialType::Direct, DifferentialType::FullLocked] {
            let mut d = diff(kind);
            for _ in 0..1_000 {
                let t = rng.gen_range(-500.0..500.0);
                let (l, r) = d.split(t, rng.gen_range(-2000.0..2000.0), rng.gen_range(-2000.0..2000.0));
                assert_relative_eq!(l + r, d.produced_torque(), epsilon = 1e-2, max_relative = 1e-5);
            }
        }
    }

    #[test]
    fn direct_splits_evenly() {
        let mut d = diff(DifferentialType::Direct);
        assert_eq!(d.split(100.0, 900.0, 100.0), (200.0, 200.0));
    }

    #[test]
    fn full_locked_bias_is_half() {
        let mut d = diff(DifferentialType::FullLocked);
        let (l, r) = d.split(100.0, 900.0, 100.0);
        assert_eq!(d.biases(), (0.5, -0.5));
        assert_eq!((l, r), (0.0, 400.0));
    }

    #[test]
    fn open_favours_slower_wheel() {
        let mut d = diff(DifferentialType::Open);
        let (l, r) = d.split(100.0, 300.0, 100.0);
        assert_relative_eq!(d.slip_ratio(), 0.5);
        assert!(r > l);
        assert_relative_eq!(l + r, 400.0);
    }

    #[test]
    fn limited_scales_open_bias() {
        let mut open = diff(DifferentialType::Open);
        let mut limited = diff(DifferentialType::Limited);
        open.split(100.0, 300.0, 200.0);
        limited.split(100.0, 300.0, 200.0);
        assert_relative_eq!(limited.biases().0, open.biases().0 * 0.5);
    }

    #[test]
    fn reverse_favours_slower_wheel_for_every_kind() {
        // left turns slower than right in both directions
        for kind in [DifferentialType::Open, DifferentialType::Limited, DifferentialType::FullLocked] {
            let mut d = diff(kind);
            let (fl, fr) = d.split(100.0, 100.0, 300.0);
            let forward_bias = d.biases();
            let (rl, rr) = d.split(-100.0, -100.0, -300.0);

            assert_eq!(d.biases(), forward_bias, "{kind:?}");
            assert!(rl.abs() > rr.abs(), "{kind:?}: left {rl} right {rr}");
            assert_relative_eq!(rl, -fl);
            assert_relative_eq!(rr, -fr);
            assert_relative_eq!(rl + rr, -400.0);
        }
    }

    #[test]
    fn reverse_split_values() {
        let mut open = diff(DifferentialType::Open);
        let (l, r) = open.split(-100.0, -100.0, -300.0);
        assert_relative_eq!(open.slip_ratio(), 0.5);
        assert_relative_eq!(l, -400.0);
        assert_relative_eq!(r, 0.0);

        // left spins faster backwards and gets nothing
        assert_eq!(open.split(-100.0, -300.0, -100.0), (0.0, -400.0));

        let mut limited = diff(DifferentialType::Limited);
        let (l, r) = limited.split(-100.0, -100.0, -300.0);
        assert_relative_eq!(limited.biases().0, -0.25);
        assert_relative_eq!(l, -300.0);
        assert_relative_eq!(r, -100.0);

        let mut locked = diff(DifferentialType::FullLocked);
        assert_eq!(locked.split(-100.0, -900.0, -100.0), (0.0, -400.0));

        let mut direct = diff(DifferentialType::Direct);
        assert_eq!(direct.split(-100.0, -900.0, -100.0), (-200.0, -200.0));
    }

    #[test]
    fn open_and_limited_conserve_torque_in_reverse() {
        let mut rng = StdRng::seed_from_u64(5);
        for kind in [DifferentialType::Open, DifferentialType::Limited] {
            let mut d = diff(kind);
            for _ in 0..1_000 {
                let t = rng.gen_range(-500.0..0.0);
                let (l, r) = d.split(t, rng.gen_range(-2000.0..0.0), rng.gen_range(-2000.0..0.0));
                assert_relative_eq!(l + r, d.produced_torque(), epsilon = 1e-2, max_relative = 1e-5);
                assert!(l <= 0.0 && r <= 0.0);
            }
        }
    }

    #[test]
    fn zero_rpm_sum_is_guarded() {
        let mut d = diff(DifferentialType::Open);
        let (l, r) = d.split(100.0, 0.0, 0.0);
        assert_eq!(d.slip_ratio(), 0.0);
        assert_eq!((l, r), (200.0, 200.0));
        let (l, r) = d.split(100.0, f32::NAN, 0.0);
        assert!(l.is_finite() && r.is_finite());
    }
}
