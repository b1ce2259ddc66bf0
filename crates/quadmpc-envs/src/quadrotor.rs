//! Rigid-body quadrotor simulator.

use ndarray::{Array1, ArrayView1, Axis};
use quadmpc::env::{EnvInfo, InitialPose, QuadEnv, StepResult};
use quadmpc::reward::{DistanceReward, RewardFn};
use quadmpc::spaces::Box as BoxSpace;
use quadmpc::{QuadError, Result};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;

type Vec3 = [f32; 3];
type Mat3 = [[f32; 3]; 3];

const GRAVITY: f32 = 9.81;
const MAX_COMMAND: f32 = 100.0;

/// Plus-configuration quadrotor driven by four rotor commands in `[0, 100]`.
///
/// Observation (18): rotation matrix (row-major, body to world), position,
/// body angular velocity, world linear velocity.
/// Reward and termination come from a `DistanceReward` around the target.
///
/// All four rotors at 50 hover the vehicle.
pub struct Quadrotor {
    // Physical constants
    mass: f32,
    arm: f32,
    inertia: Vec3,
    thrust_per_command: f32,
    yaw_coefficient: f32,
    linear_drag: f32,
    angular_drag: f32,
    dt: f32,
    substeps: usize,

    /// Rotor index and the fraction of thrust it still delivers
    crippled: Option<(usize, f32)>,
    spawn_radius: f32,
    orientation_std: f32,

    // State
    position: Vec3,
    velocity: Vec3,
    rotation: Mat3,
    angular_velocity: Vec3,

    reward: DistanceReward,
    rng: StdRng,
}

impl Quadrotor {
    pub fn new() -> Self {
        let mass = 0.5;
        Self {
            mass,
            arm: 0.2,
            inertia: [5e-3, 5e-3, 1e-2],
            thrust_per_command: mass * GRAVITY / 200.0,
            yaw_coefficient: 0.02,
            linear_drag: 0.1,
            angular_drag: 0.05,
            dt: 0.05,
            substeps: 5,
            crippled: None,
            spawn_radius: 3.1,
            orientation_std: 0.6,
            position: [0.0; 3],
            velocity: [0.0; 3],
            rotation: identity(),
            angular_velocity: [0.0; 3],
            reward: DistanceReward::quadrotor(Array1::zeros(3)),
            rng: StdRng::from_entropy(),
        }
    }

    /// Scale one rotor's thrust by `efficiency` (0 disables it).
    pub fn with_crippled_rotor(mut self, rotor: usize, efficiency: f32) -> Result<Self> {
        if rotor >= 4 {
            return Err(QuadError::Config(format!("no rotor {rotor}")));
        }
        self.crippled = Some((rotor, efficiency.clamp(0.0, 1.0)));
        Ok(self)
    }

    pub fn with_reward(mut self, reward: DistanceReward) -> Self {
        self.reward = reward;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    pub fn position(&self) -> Vec3 {
        self.position
    }

    fn observation(&self) -> Array1<f32> {
        let mut obs = Vec::with_capacity(18);
        obs.extend(self.rotation.iter().flatten());
        obs.extend(self.position);
        obs.extend(self.angular_velocity);
        obs.extend(self.velocity);
        Array1::from(obs)
    }

    /// Uniform position in a cube inscribed in the spawn sphere around the target.
    fn random_pose(&mut self) -> (Vec3, Vec3) {
        let half = (self.spawn_radius * self.spawn_radius / 3.0).sqrt();
        let target = self.reward.target();
        let mut position = [0.0; 3];
        for (p, t) in position.iter_mut().zip(target.iter()) {
            *p = t + self.rng.gen_range(-half..half);
        }
        let mut angles = [0.0; 3];
        for a in angles.iter_mut() {
            let n: f32 = self.rng.sample(StandardNormal);
            *a = n * self.orientation_std;
        }
        (position, angles)
    }

    fn rotor_thrusts(&self, action: ArrayView1<f32>) -> [f32; 4] {
        let mut thrusts = [0.0; 4];
        for (i, (t, &u)) in thrusts.iter_mut().zip(action.iter()).enumerate() {
            let mut thrust = u.clamp(0.0, MAX_COMMAND) * self.thrust_per_command;
            if let Some((rotor, efficiency)) = self.crippled {
                if rotor == i {
                    thrust *= efficiency;
                }
            }
            *t = thrust;
        }
        thrusts
    }

    fn integrate(&mut self, thrusts: [f32; 4], h: f32) {
        let [t0, t1, t2, t3] = thrusts;
        let total = t0 + t1 + t2 + t3;
        let torque = [
            self.arm * (t1 - t3),
            self.arm * (t2 - t0),
            self.yaw_coefficient * (t0 - t1 + t2 - t3),
        ];

        // Translational: thrust along body z, gravity, linear drag.
        let body_z = [self.rotation[0][2], self.rotation[1][2], self.rotation[2][2]];
        for i in 0..3 {
            let mut accel = body_z[i] * total / self.mass - self.linear_drag * self.velocity[i] / self.mass;
            if i == 2 {
                accel -= GRAVITY;
            }
            self.velocity[i] += accel * h;
            self.position[i] += self.velocity[i] * h;
        }

        // Rotational (body frame): I w' = tau - w x I w.
        let w = self.angular_velocity;
        let iw = [self.inertia[0] * w[0], self.inertia[1] * w[1], self.inertia[2] * w[2]];
        let gyro = cross(w, iw);
        for i in 0..3 {
            let alpha = (torque[i] - gyro[i]) / self.inertia[i] - self.angular_drag * w[i];
            self.angular_velocity[i] += alpha * h;
        }

        let step = scale(self.angular_velocity, h);
        self.rotation = matmul(self.rotation, exp_so3(step));
    }

    fn is_finite(&self) -> bool {
        self.position
            .iter()
            .chain(self.velocity.iter())
            .chain(self.angular_velocity.iter())
            .chain(self.rotation.iter().flatten())
            .all(|v| v.is_finite())
    }
}

impl Default for Quadrotor {
    fn default() -> Self {
        Self::new()
    }
}

impl QuadEnv for Quadrotor {
    fn observation_space(&self) -> BoxSpace {
        BoxSpace::unbounded(18)
    }

    fn action_space(&self) -> BoxSpace {
        BoxSpace::uniform(4, 0.0, MAX_COMMAND)
    }

    fn seed(&mut self, seed: u64) {
        self.rng = StdRng::seed_from_u64(seed);
    }

    fn reset(&mut self, pose: Option<&InitialPose>) -> Result<(Array1<f32>, EnvInfo)> {
        let (position, angles) = match pose {
            Some(pose) => (to_vec3(pose.position.view())?, to_vec3(pose.orientation.view())?),
            None => self.random_pose(),
        };
        self.position = position;
        self.rotation = euler_zyx(angles);
        self.velocity = [0.0; 3];
        self.angular_velocity = [0.0; 3];
        Ok((self.observation(), EnvInfo::new()))
    }

    fn step(&mut self, action: ArrayView1<f32>) -> Result<StepResult> {
        if action.len() != 4 {
            return Err(QuadError::length(4, action.len()));
        }
        let thrusts = self.rotor_thrusts(action);
        let h = self.dt / self.substeps as f32;
        for _ in 0..self.substeps {
            self.integrate(thrusts, h);
        }
        if !self.is_finite() {
            return Err(QuadError::EnvironmentStep("simulation diverged".into()));
        }

        let observation = self.observation();
        let distance = self.reward.distance(observation.view());
        let reward = self
            .reward
            .reward(observation.view().insert_axis(Axis(0)))[0];
        let terminated = self.reward.is_done(observation.view());
        Ok(StepResult {
            observation,
            reward,
            terminated,
            truncated: false,
            info: EnvInfo::new().with_extra("distance", distance),
        })
    }

    fn set_target_position(&mut self, target: ArrayView1<f32>) -> Result<()> {
        self.reward.set_target(target)
    }

    fn target_position(&self) -> Option<Array1<f32>> {
        Some(self.reward.target().to_owned())
    }

    fn dt(&self) -> f32 {
        self.dt
    }

    fn render(&self) -> Option<String> {
        let [x, y, z] = self.position;
        let target = self.reward.target();
        Some(format!(
            "pos=({x:.2}, {y:.2}, {z:.2}) target=({:.2}, {:.2}, {:.2})",
            target[0], target[1], target[2]
        ))
    }
}

fn to_vec3(v: ArrayView1<f32>) -> Result<Vec3> {
    if v.len() != 3 {
        return Err(QuadError::length(3, v.len()));
    }
    Ok([v[0], v[1], v[2]])
}

fn identity() -> Mat3 {
    [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]]
}

fn cross(a: Vec3, b: Vec3) -> Vec3 {
    [
        a[1] * b[2] - a[2] * b[1],
        a[2] * b[0] - a[0] * b[2],
        a[0] * b[1] - a[1] * b[0],
    ]
}

fn scale(a: Vec3, s: f32) -> Vec3 {
    [a[0] * s, a[1] * s, a[2] * s]
}

fn matmul(a: Mat3, b: Mat3) -> Mat3 {
    let mut out = [[0.0; 3]; 3];
    for (i, row) in out.iter_mut().enumerate() {
        for (j, v) in row.iter_mut().enumerate() {
            *v = (0..3).map(|k| a[i][k] * b[k][j]).sum();
        }
    }
    out
}

/// Rotation for a rotation vector (Rodrigues).
fn exp_so3(w: Vec3) -> Mat3 {
    let theta = (w[0] * w[0] + w[1] * w[1] + w[2] * w[2]).sqrt();
    if theta < 1e-8 {
        return identity();
    }
    let [x, y, z] = scale(w, 1.0 / theta);
    let (s, c) = theta.sin_cos();
    let t = 1.0 - c;
    [
        [c + x * x * t, x * y * t - z * s, x * z * t + y * s],
        [y * x * t + z * s, c + y * y * t, y * z * t - x * s],
        [z * x * t - y * s, z * y * t + x * s, c + z * z * t],
    ]
}

/// `Rz(yaw) * Ry(pitch) * Rx(roll)` from `[roll, pitch, yaw]`.
fn euler_zyx([roll, pitch, yaw]: Vec3) -> Mat3 {
    let (sr, cr) = roll.sin_cos();
    let (sp, cp) = pitch.sin_cos();
    let (sy, cy) = yaw.sin_cos();
    [
        [cy * cp, cy * sp * sr - sy * cr, cy * sp * cr + sy * sr],
        [sy * cp, sy * sp * sr + cy * cr, sy * sp * cr - cy * sr],
        [-sp, cp * sr, cp * cr],
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn hover() -> Array1<f32> {
        Array1::from_elem(4, 50.0)
    }

    fn at_origin(env: &mut Quadrotor) {
        env.reset(Some(&InitialPose::origin())).unwrap();
    }

    #[test]
    fn test_spaces() {
        let env = Quadrotor::new();
        assert_eq!(env.observation_space().dim(), 18);
        assert_eq!(env.action_space().dim(), 4);
        assert_eq!(env.action_space().high[0], 100.0);
    }

    #[test]
    fn test_hover_holds_position() {
        let mut env = Quadrotor::new();
        at_origin(&mut env);
        for _ in 0..20 {
            let result = env.step(hover().view()).unwrap();
            assert!(!result.done());
        }
        let [x, y, z] = env.position();
        assert!(x.abs() < 1e-4 && y.abs() < 1e-4 && z.abs() < 1e-3);
    }

    #[test]
    fn test_zero_thrust_falls() {
        let mut env = Quadrotor::new();
        at_origin(&mut env);
        let result = env.step(Array1::zeros(4).view()).unwrap();
        assert!(result.observation[11] < 0.0);
        assert!(result.observation[17] < 0.0);
    }

    #[test]
    fn test_rotation_stays_orthonormal() {
        let mut env = Quadrotor::new();
        at_origin(&mut env);
        for _ in 0..30 {
            env.step(array![60.0f32, 40.0, 55.0, 45.0].view()).unwrap();
        }
        let r = env.rotation;
        for i in 0..3 {
            for j in 0..3 {
                let dot: f32 = (0..3).map(|k| r[k][i] * r[k][j]).sum();
                let expected = if i == j { 1.0 } else { 0.0 };
                assert!((dot - expected).abs() < 1e-3);
            }
        }
    }

    #[test]
    fn test_reward_and_done_follow_target() {
        let mut env = Quadrotor::new();
        at_origin(&mut env);
        env.set_target_position(array![0.0f32, 0.0, 0.0].view()).unwrap();
        let near = env.step(hover().view()).unwrap();
        assert!((near.reward - 4.0).abs() < 1e-2);

        at_origin(&mut env);
        env.set_target_position(array![3.5f32, 0.0, 0.0].view()).unwrap();
        let far = env.step(hover().view()).unwrap();
        assert!(far.terminated);
        assert!(far.info.get("distance").unwrap() > 3.2);
    }

    #[test]
    fn test_random_reset_near_target() {
        let mut env = Quadrotor::new().with_seed(3);
        env.set_target_position(array![0.8f32, 0.8, 0.8].view()).unwrap();
        for _ in 0..20 {
            let (obs, _) = env.reset(None).unwrap();
            let d = env.reward.distance(obs.view());
            assert!(d <= 3.1 + 1e-4);
        }
    }

    #[test]
    fn test_seeded_reset_is_deterministic() {
        let mut a = Quadrotor::new();
        let mut b = Quadrotor::new();
        a.seed(7);
        b.seed(7);
        assert_eq!(a.reset(None).unwrap().0, b.reset(None).unwrap().0);
    }

    #[test]
    fn test_crippled_rotor_tilts() {
        let mut env = Quadrotor::new().with_crippled_rotor(0, 0.0).unwrap();
        at_origin(&mut env);
        let result = env.step(hover().view()).unwrap();
        // Without rotor 0 (+x) the opposite rotor pitches the body about +y.
        assert!(result.observation[13] > 0.0);
        assert!(Quadrotor::new().with_crippled_rotor(4, 0.5).is_err());
    }

    #[test]
    fn test_fixed_pose_reset() {
        let mut env = Quadrotor::new();
        let pose = InitialPose::new(array![1.0, 2.0, 3.0], array![0.0, 0.0, std::f32::consts::FRAC_PI_2]);
        let (obs, _) = env.reset(Some(&pose)).unwrap();
        assert_eq!(obs.slice(ndarray::s![9..12]).to_vec(), vec![1.0f32, 2.0, 3.0]);
        // Yaw of 90 degrees maps body x onto world y.
        assert!((obs[3] - 1.0).abs() < 1e-6);
    }
}
