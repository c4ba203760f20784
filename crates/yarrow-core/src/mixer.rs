//! Motor mixing for the X-configuration quadrotor.
//!
//! Rotor layout and spin directions (front is +Y):
//!
//! ```text
//!   CW 3   1 CCW
//!       \ /        Y
//!       / \        |_ X
//!  CCW 2   4 CW
//! ```

/// Map the control vector `u = [thrust, roll, pitch, yaw]` onto the four
/// rotors. Output order matches the ESC channels 1..4.
pub fn mix(u: [f32; 4]) -> [f32; 4] {
    [
        u[0] - u[1] + u[2] - u[3],
        u[0] + u[1] - u[2] - u[3],
        u[0] + u[1] + u[2] + u[3],
        u[0] - u[1] - u[2] + u[3],
    ]
}

/// If any channel would exceed 1, shift all four down by the overshoot.
/// This keeps the roll/pitch/yaw torque differentials intact under heavy
/// vertical acceleration at the cost of net thrust. Lower saturation is
/// handled by [`clamp_unit`].
pub fn desaturate(esc: &mut [f32; 4]) {
    let mut largest = 0.0f32;
    for &m in esc.iter() {
        if m > largest {
            largest = m;
        }
    }
    if largest > 1.0 {
        let offset = largest - 1.0;
        for m in esc.iter_mut() {
            *m -= offset;
        }
    }
}

/// Final clamp of every channel into the normalized pulse range [0, 1].
pub fn clamp_unit(esc: &mut [f32; 4]) {
    for m in esc.iter_mut() {
        *m = m.clamp(0.0, 1.0);
    }
}
