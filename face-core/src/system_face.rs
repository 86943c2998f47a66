// System-mode faces: each mode drives the face features (eyes, mouth,
// eyelids, color) instead of an abstract splash, plus the small icon
// overlays drawn on top of the rendered face.

use libm::{cosf, fabsf, fminf, fmodf, sinf, sqrtf};

use crate::config::{SCREEN_H, SCREEN_W};
use crate::framebuffer::Framebuffer;
use crate::state::{FaceState, SystemMode};

const PI: f32 = core::f32::consts::PI;

fn clampf(v: f32, lo: f32, hi: f32) -> f32 {
    if v < lo {
        lo
    } else if v > hi {
        hi
    } else {
        v
    }
}

fn set_color(fs: &mut FaceState, r: i32, g: i32, b: i32) {
    fs.color_override = Some((
        r.clamp(0, 255) as u8,
        g.clamp(0, 255) as u8,
        b.clamp(0, 255) as u8,
    ));
}

// The drapes own the pose while a mode is active: write the value and its
// target together so the regular tween cannot fight the drape.
fn set_pair(value: &mut f32, target: &mut f32, v: f32) {
    *value = v;
    *target = v;
}

// "Waking up": slits open, yawn, quick blink, happy bounce.
fn booting(fs: &mut FaceState, elapsed: f32) {
    const BOOT_DUR: f32 = 3.0;
    let t = clampf(elapsed / BOOT_DUR, 0.0, 1.0);

    if t < 0.4 {
        let p = t / 0.4;
        let droop = 0.6 * (1.0 - p);
        fs.eyelids.top_l = droop;
        fs.eyelids.top_r = droop;
        let h = 0.7 + 0.15 * p;
        set_pair(&mut fs.eye_l.height_scale, &mut fs.eye_l.height_scale_target, h);
        set_pair(&mut fs.eye_r.height_scale, &mut fs.eye_r.height_scale_target, h);
        fs.eyelids.slope = -0.2 * (1.0 - p);
        set_color(
            fs,
            (70.0 + (50.0 - 70.0) * p) as i32,
            (90.0 + (150.0 - 90.0) * p) as i32,
            (140.0 + (255.0 - 140.0) * p) as i32,
        );
    } else if t < 0.65 {
        let p = (t - 0.4) / 0.25;
        let yawn = sinf(p * PI);
        set_pair(&mut fs.mouth_open, &mut fs.mouth_open_target, 0.6 * yawn);
        set_pair(&mut fs.mouth_width, &mut fs.mouth_width_target, 1.0 + 0.2 * yawn);
        set_pair(&mut fs.mouth_curve, &mut fs.mouth_curve_target, -0.1 * yawn);
        fs.eyelids.top_l = 0.15 * yawn;
        fs.eyelids.top_r = 0.15 * yawn;
        let h = 0.85 - 0.1 * yawn;
        set_pair(&mut fs.eye_l.height_scale, &mut fs.eye_l.height_scale_target, h);
        set_pair(&mut fs.eye_r.height_scale, &mut fs.eye_r.height_scale_target, h);
        set_color(fs, 50, 150, 255);
    } else if t < 0.85 {
        let p = (t - 0.65) / 0.2;
        let blink_p = fabsf(p - 0.5) * 2.0;
        let lid = if p > 0.4 && p < 0.6 {
            0.7 * (1.0 - blink_p)
        } else {
            0.0
        };
        fs.eyelids.top_l = lid;
        fs.eyelids.top_r = lid;
        set_pair(&mut fs.eye_l.height_scale, &mut fs.eye_l.height_scale_target, 1.0);
        set_pair(&mut fs.eye_r.height_scale, &mut fs.eye_r.height_scale_target, 1.0);
        set_color(fs, 50, 150, 255);
    } else {
        let p = (t - 0.85) / 0.15;
        let bounce = sinf(p * PI) * 0.05;
        set_pair(&mut fs.eye_l.height_scale, &mut fs.eye_l.height_scale_target, 1.0 + bounce);
        set_pair(&mut fs.eye_r.height_scale, &mut fs.eye_r.height_scale_target, 1.0 + bounce);
        set_pair(&mut fs.mouth_curve, &mut fs.mouth_curve_target, 0.3 * sinf(p * PI));
        set_color(
            fs,
            (50.0 * (1.0 - p)) as i32,
            (150.0 + 105.0 * p) as i32,
            (255.0 - 55.0 * p) as i32,
        );
    }

    fs.fx.breathing = t > 0.7;
}

// "Confused": worried expression + slow headshake, amber.
fn error(fs: &mut FaceState, elapsed: f32) {
    fs.eyelids.slope = 0.2;
    fs.eyelids.top_l = 0.1;
    fs.eyelids.top_r = 0.1;
    set_pair(&mut fs.mouth_curve, &mut fs.mouth_curve_target, -0.2);
    set_pair(
        &mut fs.mouth_offset_x,
        &mut fs.mouth_offset_x_target,
        2.0 * sinf(elapsed * 3.0),
    );

    let shake = sinf(elapsed * 4.0) * 3.0;
    set_pair(&mut fs.eye_l.gaze_x, &mut fs.eye_l.gaze_x_target, shake);
    set_pair(&mut fs.eye_r.gaze_x, &mut fs.eye_r.gaze_x_target, shake);

    set_color(fs, 220, 160, 60);
    fs.expression_intensity = 0.7;
}

// "Sleepy": heavy lids scaled by remaining charge, yawns when critical.
fn low_battery(fs: &mut FaceState, elapsed: f32) {
    let lvl = clampf(fs.system.param, 0.0, 1.0);

    let droop = 0.4 + 0.2 * (1.0 - lvl);
    fs.eyelids.top_l = droop;
    fs.eyelids.top_r = droop;
    fs.eyelids.slope = -0.2;
    set_pair(&mut fs.eye_l.height_scale, &mut fs.eye_l.height_scale_target, 0.75);
    set_pair(&mut fs.eye_r.height_scale, &mut fs.eye_r.height_scale_target, 0.75);

    if lvl < 0.2 {
        let yawn_cycle = fmodf(elapsed, 6.0);
        if yawn_cycle < 1.5 {
            let yawn = sinf(yawn_cycle / 1.5 * PI);
            set_pair(&mut fs.mouth_open, &mut fs.mouth_open_target, 0.5 * yawn);
            set_pair(&mut fs.mouth_width, &mut fs.mouth_width_target, 1.0 + 0.1 * yawn);
            let lid = fminf(0.8, droop + 0.2 * yawn);
            fs.eyelids.top_l = lid;
            fs.eyelids.top_r = lid;
        }
    }

    fs.fx.breathing = true;

    let dim = 0.6 + 0.4 * lvl;
    set_color(fs, (70.0 * dim) as i32, (90.0 * dim) as i32, (140.0 * dim) as i32);
    fs.brightness = 0.7 + 0.3 * lvl;
}

// "Thinking hard": gaze drifts up-right with a brow furrow.
fn updating(fs: &mut FaceState, elapsed: f32) {
    fs.eyelids.slope = 0.4;
    fs.eyelids.top_l = 0.2;
    fs.eyelids.top_r = 0.2;
    set_pair(&mut fs.mouth_curve, &mut fs.mouth_curve_target, -0.1);
    set_pair(&mut fs.mouth_offset_x, &mut fs.mouth_offset_x_target, 1.5);

    let gx = 6.0 + sinf(elapsed * 0.8) * 2.0;
    let gy = -4.0 + cosf(elapsed * 0.6) * 1.5;
    set_pair(&mut fs.eye_l.gaze_x, &mut fs.eye_l.gaze_x_target, gx);
    set_pair(&mut fs.eye_r.gaze_x, &mut fs.eye_r.gaze_x_target, gx);
    set_pair(&mut fs.eye_l.gaze_y, &mut fs.eye_l.gaze_y_target, gy);
    set_pair(&mut fs.eye_r.gaze_y, &mut fs.eye_r.gaze_y_target, gy);

    set_color(fs, 80, 135, 220);
    fs.expression_intensity = 0.6;
}

// "Going to sleep": yawn, droop, close, fade.
fn shutting_down(fs: &mut FaceState, elapsed: f32) {
    const SHUT_DUR: f32 = 2.5;
    let t = clampf(elapsed / SHUT_DUR, 0.0, 1.0);

    if t < 0.3 {
        let p = t / 0.3;
        let yawn = sinf(p * PI);
        set_pair(&mut fs.mouth_open, &mut fs.mouth_open_target, 0.5 * yawn);
        set_pair(&mut fs.mouth_width, &mut fs.mouth_width_target, 1.0 + 0.15 * yawn);
        fs.eyelids.top_l = 0.1 * yawn;
        fs.eyelids.top_r = 0.1 * yawn;
        let h = 1.0 - 0.1 * yawn;
        set_pair(&mut fs.eye_l.height_scale, &mut fs.eye_l.height_scale_target, h);
        set_pair(&mut fs.eye_r.height_scale, &mut fs.eye_r.height_scale_target, h);
    } else if t < 0.6 {
        let p = (t - 0.3) / 0.3;
        let droop = 0.15 + 0.35 * p;
        fs.eyelids.top_l = droop;
        fs.eyelids.top_r = droop;
        let h = 0.9 - 0.15 * p;
        set_pair(&mut fs.eye_l.height_scale, &mut fs.eye_l.height_scale_target, h);
        set_pair(&mut fs.eye_r.height_scale, &mut fs.eye_r.height_scale_target, h);
        fs.eyelids.slope = -0.2 * p;
        let sway = sinf(elapsed * 2.0) * 3.0 * (1.0 - p);
        set_pair(&mut fs.eye_l.gaze_x, &mut fs.eye_l.gaze_x_target, sway);
        set_pair(&mut fs.eye_r.gaze_x, &mut fs.eye_r.gaze_x_target, sway);
    } else if t < 0.85 {
        let p = (t - 0.6) / 0.25;
        fs.eyelids.top_l = 0.5 + 0.5 * p;
        fs.eyelids.top_r = 0.5 + 0.5 * p;
        let h = 0.75 - 0.35 * p;
        set_pair(&mut fs.eye_l.height_scale, &mut fs.eye_l.height_scale_target, h);
        set_pair(&mut fs.eye_r.height_scale, &mut fs.eye_r.height_scale_target, h);
        fs.eyelids.slope = -0.2;
        // Content smile as the eyes close.
        set_pair(&mut fs.mouth_curve, &mut fs.mouth_curve_target, 0.3 * p);
    } else {
        let p = (t - 0.85) / 0.15;
        fs.eyelids.top_l = 1.0;
        fs.eyelids.top_r = 1.0;
        set_pair(&mut fs.eye_l.height_scale, &mut fs.eye_l.height_scale_target, 0.4);
        set_pair(&mut fs.eye_r.height_scale, &mut fs.eye_r.height_scale_target, 0.4);
        set_pair(&mut fs.mouth_curve, &mut fs.mouth_curve_target, 0.3);
        fs.brightness = 1.0 - p;
    }

    if t < 0.6 {
        let frac = t / 0.6;
        set_color(
            fs,
            (50.0 * (1.0 - frac) + 70.0 * frac) as i32,
            (150.0 * (1.0 - frac) + 90.0 * frac) as i32,
            (255.0 * (1.0 - frac) + 140.0 * frac) as i32,
        );
    } else {
        let frac = (t - 0.6) / 0.4;
        set_color(
            fs,
            (70.0 * (1.0 - frac)) as i32,
            (90.0 * (1.0 - frac)) as i32,
            (140.0 * (1.0 - frac)) as i32,
        );
    }

    fs.fx.breathing = t < 0.5;
}

/// Drape the face for the active system mode. Runs after the animation
/// advance and before rendering; a no-op when no mode is active.
pub fn apply(fs: &mut FaceState, now_s: f32) {
    let elapsed = now_s - fs.system.timer;
    fs.color_override = None;

    match fs.system.mode {
        SystemMode::None => {}
        SystemMode::Booting => booting(fs, elapsed),
        SystemMode::Error => error(fs, elapsed),
        SystemMode::LowBattery => low_battery(fs, elapsed),
        SystemMode::Updating => updating(fs, elapsed),
        SystemMode::ShuttingDown => shutting_down(fs, elapsed),
    }
}

// ---- Icon overlays (SDF-based) ----

fn sd_circle(px: f32, py: f32, cx: f32, cy: f32, r: f32) -> f32 {
    let dx = px - cx;
    let dy = py - cy;
    sqrtf(dx * dx + dy * dy) - r
}

fn sd_rounded_box(px: f32, py: f32, cx: f32, cy: f32, hw: f32, hh: f32, r: f32) -> f32 {
    let dx = fabsf(px - cx) - hw + r;
    let dy = fabsf(py - cy) - hh + r;
    let mx = if dx > 0.0 { dx } else { 0.0 };
    let my = if dy > 0.0 { dy } else { 0.0 };
    let inside = if dx > dy { dx } else { dy };
    (if inside < 0.0 { inside } else { 0.0 }) + sqrtf(mx * mx + my * my) - r
}

// Point-up equilateral triangle around (cx, cy).
fn sd_triangle(px: f32, py: f32, cx: f32, cy: f32, r: f32) -> f32 {
    const K: f32 = 1.73205; // sqrt(3)
    let x = px - cx;
    let y = py - cy;
    let d = fmaxf2(-x * 0.5 - y * K * 0.5, x * 0.5 - y * K * 0.5);
    fmaxf2(d, y - r * 0.25)
}

fn fmaxf2(a: f32, b: f32) -> f32 {
    if a > b {
        a
    } else {
        b
    }
}

fn smoothstep(edge0: f32, edge1: f32, x: f32) -> f32 {
    let t = clampf((x - edge0) / (edge1 - edge0), 0.0, 1.0);
    t * t * (3.0 - 2.0 * t)
}

/// Warning triangle + exclamation, lower-right corner.
pub fn render_error_icon(fb: &mut Framebuffer) {
    let icon_cx = (SCREEN_W - 22) as f32;
    let icon_cy = (SCREEN_H - 22) as f32;
    let icon_r = 10.0;

    let x0 = SCREEN_W - 36;
    let y0 = SCREEN_H - 36;
    for y in y0..SCREEN_H {
        for x in x0..SCREEN_W {
            let px = x as f32 + 0.5;
            let py = y as f32 + 0.5;

            let d_tri = sd_triangle(px, py, icon_cx, icon_cy, icon_r);
            let alpha = 1.0 - smoothstep(0.0, 1.5, d_tri);
            fb.blend_at(x, y, 255, 180, 50, alpha);

            let d_bar = sd_rounded_box(px, py, icon_cx, icon_cy - 2.0, 1.5, 4.0, 0.5);
            let d_dot = sd_circle(px, py, icon_cx, icon_cy + 4.5, 1.5);
            let d_mark = if d_bar < d_dot { d_bar } else { d_dot };
            let alpha_m = 1.0 - smoothstep(0.0, 1.0, d_mark);
            fb.blend_at(x, y, 0, 0, 0, alpha_m);
        }
    }
}

/// Battery glyph with level fill, lower-right corner.
pub fn render_battery_icon(fb: &mut Framebuffer, level: f32) {
    let bx = (SCREEN_W - 24) as f32;
    let by = (SCREEN_H - 18) as f32;
    let bw = 16.0;
    let bh = 10.0;
    let lvl = clampf(level, 0.0, 1.0);

    let (cr, cg, cb) = if lvl > 0.5 {
        (0, 220, 100)
    } else if lvl > 0.2 {
        (220, 180, 0)
    } else {
        (220, 40, 40)
    };

    let x0 = SCREEN_W - 36;
    let y0 = SCREEN_H - 26;
    for y in y0..SCREEN_H {
        for x in x0..SCREEN_W {
            let px = x as f32 + 0.5;
            let py = y as f32 + 0.5;

            let d_out = sd_rounded_box(px, py, bx, by, bw / 2.0, bh / 2.0, 1.5);
            let d_in = sd_rounded_box(px, py, bx, by, bw / 2.0 - 1.5, bh / 2.0 - 1.5, 0.5);
            let d_tip = sd_rounded_box(px, py, bx + bw / 2.0 + 2.0, by, 1.5, 3.0, 0.5);
            let d_shell = fminf(fmaxf2(d_out, -d_in), d_tip);
            let alpha_s = 1.0 - smoothstep(0.0, 1.0, d_shell);
            fb.blend_at(x, y, 180, 180, 190, alpha_s);

            let fill_right = (bx - bw / 2.0 + 1.5) + (bw - 3.0) * lvl;
            if d_in < 0.0 && px < fill_right {
                fb.blend_at(x, y, cr, cg, cb, 0.9);
            }
        }
    }
}

/// Thin progress bar along the bottom edge.
pub fn render_updating_bar(fb: &mut Framebuffer, progress: f32) {
    let bar_y = SCREEN_H - 4;
    let bar_h = 2;
    let bar_x0 = 20;
    let bar_x1 = SCREEN_W - 20;
    let fill_x = bar_x0 + ((bar_x1 - bar_x0) as f32 * clampf(progress, 0.0, 1.0)) as i32;

    for y in bar_y..(bar_y + bar_h).min(SCREEN_H) {
        for x in bar_x0..bar_x1 {
            if x < fill_x {
                fb.blend_at(x, y, 80, 135, 220, 0.8);
            } else {
                fb.blend_at(x, y, 30, 40, 60, 0.8);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::SystemState;

    fn in_mode(mode: SystemMode, param: f32) -> FaceState {
        let mut fs = FaceState::default();
        fs.fx.boot_active = false;
        fs.system = SystemState {
            mode,
            timer: 10.0,
            param,
        };
        fs
    }

    #[test]
    fn error_drape_sets_amber_and_shake() {
        let mut fs = in_mode(SystemMode::Error, 0.0);
        apply(&mut fs, 10.5);
        assert_eq!(fs.color_override, Some((220, 160, 60)));
        assert_eq!(fs.eye_l.gaze_x, fs.eye_l.gaze_x_target);
        assert!(fs.eyelids.slope > 0.0);
    }

    #[test]
    fn low_battery_dims_with_level() {
        let mut full = in_mode(SystemMode::LowBattery, 1.0);
        apply(&mut full, 10.1);
        let mut empty = in_mode(SystemMode::LowBattery, 0.0);
        apply(&mut empty, 10.1);

        assert!(empty.brightness < full.brightness);
        assert!(empty.eyelids.top_l > full.eyelids.top_l);
    }

    #[test]
    fn shutdown_closes_eyes_and_fades() {
        let mut fs = in_mode(SystemMode::ShuttingDown, 0.0);
        apply(&mut fs, 10.0 + 2.45);
        assert_eq!(fs.eyelids.top_l, 1.0);
        assert!(fs.brightness < 0.5);
        assert!(!fs.fx.breathing);
    }

    #[test]
    fn booting_progression_reaches_full_height() {
        let mut fs = in_mode(SystemMode::Booting, 0.0);
        apply(&mut fs, 10.1);
        assert!(fs.eye_l.height_scale < 0.9);

        apply(&mut fs, 12.2); // phase 3: eyes fully open
        assert!(fs.eye_l.height_scale >= 0.99);
    }

    #[test]
    fn battery_icon_draws_in_corner_only() {
        let mut fb = Framebuffer::new();
        render_battery_icon(&mut fb, 0.8);
        assert_eq!(fb.get(10, 10), 0);
        // Shell outline pixel near the glyph center row.
        let mut touched = false;
        for x in SCREEN_W - 36..SCREEN_W {
            if fb.get(x, SCREEN_H - 18) != 0 {
                touched = true;
                break;
            }
        }
        assert!(touched);
    }

    #[test]
    fn updating_bar_fill_tracks_progress() {
        let mut fb = Framebuffer::new();
        render_updating_bar(&mut fb, 0.5);
        let y = SCREEN_H - 4;
        let mid = (20 + (SCREEN_W - 40) / 2) as i32;
        // Filled left of center, unfilled right of center, different colors.
        assert_ne!(fb.get(30, y), fb.get(SCREEN_W - 30, y));
        assert_ne!(fb.get(mid - 20, y), 0);
    }
}
