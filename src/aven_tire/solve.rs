// ==============================================================================
// solve.rs — TIRE CONTACT SOLVE (FRICTION CURVES + COMBINED-SLIP ELLIPSE)
// ==============================================================================
// ------------------------------------------------------------------------------
// This module combines, for one grounded wheel:
// - Longitudinal force from the forward friction curve (slip ratio)
// - Lateral force from the sideways friction curve (slip ratio)
// - Per-tick impulse caps so a single fixed step can never overshoot:
//     (a) longitudinal: the relative slip speed (ω·r − v) may reach zero but
//         not change sign within the tick (wheel inertia + chassis share)
//     (b) lateral: at most cancels v_lat for this wheel's share of mass
//         (same "−v_lat · mass" demand the brush model used)
// - A combined-slip friction ellipse in force space:
//
//     (Fx / Fx_max)² + (Fy / Fy_max)² <= 1
//
// Output is a pair of forces along the wheel basis; wheel.rs turns it into a
// world impulse and integrates wheel spin from the longitudinal reaction.
// ==============================================================================

use crate::aven_tire::friction::FrictionCurve;

/// Inputs for one contact solve.
#[derive(Clone, Copy, Debug)]
pub struct ContactInput {
    pub forward_slip: f32,   // instantaneous ratio
    pub lateral_slip: f32,   // instantaneous ratio
    pub slip_speed: f32,     // ω·r − v_long (m/s)
    pub v_lat: f32,          // m/s
    pub load: f32,           // N
    pub forward_stiffness: f32,
    pub sideways_stiffness: f32,
    pub radius: f32,         // m
    pub inertia: f32,        // kg*m^2 (spin)
    pub mass_share: f32,     // kg of chassis carried by this wheel
    pub dt: f32,
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ContactOutput {
    pub fx: f32, // N, + pushes chassis along wheel forward
    pub fy: f32, // N, + pushes chassis along wheel right
}

/// Largest |Fx| that brings the slip speed to zero this tick and no further.
pub fn longitudinal_cap(slip_speed: f32, radius: f32, inertia: f32, mass_share: f32, dt: f32) -> f32 {
    let compliance = dt * (radius * radius / inertia.max(1e-3) + 1.0 / mass_share.max(1.0));
    if compliance <= 0.0 {
        return 0.0;
    }
    slip_speed.abs() / compliance
}

/// Largest |Fy| that cancels this wheel's lateral velocity this tick.
pub fn lateral_cap(v_lat: f32, mass_share: f32, dt: f32) -> f32 {
    if dt <= 0.0 {
        return 0.0;
    }
    v_lat.abs() * mass_share.max(1.0) / dt
}

/// Scale factor that brings (fx, fy) back inside the friction ellipse.
pub fn ellipse_scale(fx: f32, fy: f32, max_x: f32, max_y: f32) -> f32 {
    let nx = if max_x > 1e-6 { fx / max_x } else { 0.0 };
    let ny = if max_y > 1e-6 { fy / max_y } else { 0.0 };

    let ellipse = nx * nx + ny * ny;
    if ellipse > 1.0 { 1.0 / ellipse.sqrt() } else { 1.0 }
}

pub fn solve_contact(
    input: &ContactInput,
    forward_curve: &FrictionCurve,
    sideways_curve: &FrictionCurve,
) -> ContactOutput {
    if input.load <= 0.0 || input.dt <= 0.0 {
        return ContactOutput::default();
    }

    // --------------------------------------------------
    // Longitudinal
    // --------------------------------------------------
    let mu_x = forward_curve.evaluate(input.forward_slip) * input.forward_stiffness;
    let mut fx = mu_x * input.load * sign(input.forward_slip);

    let cap_x = longitudinal_cap(input.slip_speed, input.radius, input.inertia, input.mass_share, input.dt);
    fx = fx.clamp(-cap_x, cap_x);

    // --------------------------------------------------
    // Lateral (opposes lateral slip)
    // --------------------------------------------------
    let mu_y = sideways_curve.evaluate(input.lateral_slip) * input.sideways_stiffness;
    let mut fy = -mu_y * input.load * sign(input.lateral_slip);

    let cap_y = lateral_cap(input.v_lat, input.mass_share, input.dt);
    fy = fy.clamp(-cap_y, cap_y);

    // --------------------------------------------------
    // Combined slip ellipse
    // --------------------------------------------------
    let max_x = forward_curve.peak() * input.forward_stiffness * input.load;
    let max_y = sideways_curve.peak() * input.sideways_stiffness * input.load;
    let scale = ellipse_scale(fx, fy, max_x, max_y);

    let out = ContactOutput { fx: fx * scale, fy: fy * scale };
    if out.fx.is_finite() && out.fy.is_finite() { out } else { ContactOutput::default() }
}

#[inline]
fn sign(x: f32) -> f32 {
    if x > 0.0 { 1.0 } else if x < 0.0 { -1.0 } else { 0.0 }
}
