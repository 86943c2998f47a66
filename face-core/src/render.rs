// Software rasterizer: face features into the RGB565 framebuffer, then the
// dirty rectangle the display driver should flush.
//
// The afterglow shadow and the border color look like feedback loops but are
// not: both are read before this frame's features land and written after,
// all from the single render task.

use alloc::boxed::Box;
use alloc::vec;

use embedded_graphics::prelude::*;
use embedded_graphics::primitives::Rectangle;
use libm::{fabsf, fmaxf, fminf, sinf, sqrtf};

use crate::border::ConvBorder;
use crate::config::*;
use crate::framebuffer::{self, Framebuffer, PixelWord};
use crate::state::{EyeState, FaceState, SystemMode};
use crate::system_face;

const BG: PixelWord = 0;

fn clampf(v: f32, lo: f32, hi: f32) -> f32 {
    fminf(fmaxf(v, lo), hi)
}

fn smoothstep(edge0: f32, edge1: f32, x: f32) -> f32 {
    if fabsf(edge1 - edge0) < 1e-6 {
        return if x < edge0 { 0.0 } else { 1.0 };
    }
    let t = clampf((x - edge0) / (edge1 - edge0), 0.0, 1.0);
    t * t * (3.0 - 2.0 * t)
}

// ---- Afterglow shadow ----

const AFTERGLOW_W: i32 = SCREEN_W / AFTERGLOW_DOWNSAMPLE;
const AFTERGLOW_H: i32 = SCREEN_H / AFTERGLOW_DOWNSAMPLE;

/// Downsampled copy of the previous committed frame; faded under background
/// pixels to leave motion trails.
pub struct Afterglow {
    px: Box<[PixelWord]>,
}

impl Afterglow {
    pub fn new() -> Self {
        Self {
            px: vec![0; (AFTERGLOW_W * AFTERGLOW_H) as usize].into_boxed_slice(),
        }
    }

    /// Where the new frame is still background and the shadow is not,
    /// substitute a faded copy of the shadow.
    fn apply(&self, fb: &mut Framebuffer) {
        for y in 0..SCREEN_H {
            let ay = (y / AFTERGLOW_DOWNSAMPLE) * AFTERGLOW_W;
            for x in 0..SCREEN_W {
                let prev = self.px[(ay + x / AFTERGLOW_DOWNSAMPLE) as usize];
                if prev != BG && fb.get(x, y) == BG {
                    fb.set(x, y, framebuffer::scale(prev, 2, 5));
                }
            }
        }
    }

    /// Capture the committed frame into the shadow.
    fn capture(&mut self, fb: &Framebuffer) {
        for y in 0..AFTERGLOW_H {
            let src_y = y * AFTERGLOW_DOWNSAMPLE;
            for x in 0..AFTERGLOW_W {
                self.px[(y * AFTERGLOW_W + x) as usize] =
                    fb.get(x * AFTERGLOW_DOWNSAMPLE, src_y);
            }
        }
    }
}

impl Default for Afterglow {
    fn default() -> Self {
        Self::new()
    }
}

// ---- Special shapes ----

fn sd_heart(px: f32, py: f32, cx: f32, cy: f32, size: f32) -> f32 {
    let x = fabsf(px - cx) / size;
    let y = (cy - py) / size + 0.5;

    let d = if y + x > 1.0 {
        let dx = x - 0.25;
        let dy = y - 0.75;
        sqrtf(dx * dx + dy * dy) - 0.35355339
    } else {
        let dy1 = y - 1.0;
        let d1 = x * x + dy1 * dy1;
        let t = fmaxf(x + y, 0.0) * 0.5;
        let dx2 = x - t;
        let dy2 = y - t;
        let d2 = dx2 * dx2 + dy2 * dy2;
        let mut d = sqrtf(fminf(d1, d2));
        if x < y {
            d = -d;
        }
        d
    };

    d * size
}

fn draw_heart(fb: &mut Framebuffer, cx: f32, cy: f32, size: f32, color: (u8, u8, u8)) {
    if size < 1.0 {
        return;
    }
    let x0 = (cx - size - 2.0).max(0.0) as i32;
    let x1 = ((cx + size + 2.0) as i32).min(SCREEN_W);
    let y0 = (cy - size - 2.0).max(0.0) as i32;
    let y1 = ((cy + size + 2.0) as i32).min(SCREEN_H);

    for y in y0..y1 {
        for x in x0..x1 {
            let d = sd_heart(x as f32 + 0.5, y as f32 + 0.5, cx, cy, size);
            let a = 1.0 - smoothstep(-0.5, 0.5, d);
            fb.blend_at(x, y, color.0, color.1, color.2, a);
        }
    }
}

fn draw_x(fb: &mut Framebuffer, cx: i32, cy: i32, size: i32, thick: i32, color: PixelWord) {
    for y in cy - size..=cy + size {
        for x in cx - size..=cx + size {
            let dx = x - cx;
            let dy = y - cy;
            if (dx + dy).abs() <= thick || (dx - dy).abs() <= thick {
                fb.set(x, y, color);
            }
        }
    }
}

// ---- Eye ----

fn render_eye(fb: &mut Framebuffer, eye: &EyeState, fs: &FaceState, is_left: bool, center_x: f32, center_y: f32) {
    let (r, g, b) = fs.draw_color();
    let eye_color = framebuffer::rgb(r, g, b);
    let black = framebuffer::rgb(0, 0, 0);

    let breath = fs.breath_scale();
    let ew = EYE_WIDTH * eye.width_scale * breath;
    let eh = EYE_HEIGHT * eye.height_scale * fmaxf(0.25, eye.openness) * breath;
    if eh < 2.0 {
        return;
    }

    let ex = center_x + eye.gaze_x * GAZE_EYE_SHIFT - ew / 2.0;
    let ey = center_y + eye.gaze_y * GAZE_EYE_SHIFT - eh / 2.0;
    let corner = (EYE_CORNER_R * fminf(eye.width_scale, eye.height_scale)) as i32;

    if fs.solid_eye && fs.anim.heart {
        draw_heart(fb, center_x, center_y, fminf(ew, eh) * 0.4, (r, g, b));
    } else if fs.solid_eye && fs.anim.x_eyes {
        draw_x(fb, center_x as i32, center_y as i32, (fminf(ew, eh) * 0.33) as i32, 3, eye_color);
    } else {
        if fs.fx.edge_glow {
            let glow = framebuffer::scale(eye_color, 2, 5);
            fb.fill_rounded_rect(
                ex as i32 - 2,
                ey as i32 - 2,
                ew as i32 + 4,
                eh as i32 + 4,
                corner + 2,
                glow,
            );
        }
        fb.fill_rounded_rect(ex as i32, ey as i32, ew as i32, eh as i32, corner, eye_color);
    }

    if !fs.solid_eye {
        let max_offset_x = fmaxf(0.0, ew * 0.5 - PUPIL_R - 5.0);
        let max_offset_y = fmaxf(0.0, eh * 0.5 - PUPIL_R - 5.0);
        let px = center_x + clampf(eye.gaze_x * GAZE_PUPIL_SHIFT, -max_offset_x, max_offset_x);
        let py = center_y + clampf(eye.gaze_y * GAZE_PUPIL_SHIFT, -max_offset_y, max_offset_y);
        let pr = (PUPIL_R * fmaxf(0.4, eye.openness)) as i32;
        let pupil = framebuffer::rgb(10, 15, 30);
        if fs.anim.heart {
            draw_heart(fb, px, py, PUPIL_R * 0.9, (10, 15, 30));
        } else if fs.anim.x_eyes {
            draw_x(fb, px as i32, py as i32, pr, 2, pupil);
        } else if pr > 1 {
            fb.fill_circle(px as i32, py as i32, pr, pupil);
        }
    }

    // Eyelid mask: top/bottom coverage plus a signed slope that closes the
    // two sides of each eye asymmetrically.
    let lid_top = if is_left { fs.eyelids.top_l } else { fs.eyelids.top_r };
    let lid_bot = if is_left { fs.eyelids.bottom_l } else { fs.eyelids.bottom_r };
    let slope = fs.eyelids.slope;
    let x0 = ex as i32;
    let x1 = (ex + ew) as i32;
    let y0 = ey as i32;
    let y1 = (ey + eh) as i32;

    for x in x0..x1 {
        if x < 0 || x >= SCREEN_W {
            continue;
        }
        let mut nx = (x as f32 - (ex + ew * 0.5)) / fmaxf(1.0, ew * 0.5);
        if !is_left {
            nx = -nx;
        }
        let slope_off = slope * 20.0 * nx;
        let top_limit = ((ey - 0.5) + eh * 2.0 * lid_top + slope_off) as i32;
        let bot_limit = ((ey + eh) - eh * 2.0 * lid_bot) as i32;

        if top_limit > y0 {
            fb.vline(x, y0, top_limit, black);
        }
        if bot_limit < y1 {
            fb.vline(x, bot_limit, y1, black);
        }
    }
}

// ---- Mouth ----

fn render_mouth(fb: &mut Framebuffer, fs: &FaceState, now: f32) {
    if !fs.show_mouth {
        return;
    }

    let (r, g, b) = fs.draw_color();

    let cx = MOUTH_CX + fs.mouth_offset_x * 10.0;
    let cy = MOUTH_CY;
    let w = MOUTH_HALF_W * fs.mouth_width;
    let thick = MOUTH_THICKNESS;
    let curve = fs.mouth_curve * 40.0;
    let openness = fs.mouth_open * 40.0;
    if w < 1.0 {
        return;
    }

    let x0 = ((cx - w - thick) as i32).max(0);
    let x1 = ((cx + w + thick) as i32).min(SCREEN_W);
    let y0 = ((cy - fabsf(curve) - openness - thick) as i32).max(0);
    let y1 = ((cy + fabsf(curve) + openness + thick) as i32).min(SCREEN_H);
    let half_thick = thick * 0.5;

    for y in y0..y1 {
        for x in x0..x1 {
            let px = x as f32 + 0.5;
            let py = y as f32 + 0.5;
            let nx = (px - cx) / w;
            if fabsf(nx) > 1.0 {
                continue;
            }

            // Parabolic centerline, opened downward by the openness profile.
            let shape = 1.0 - nx * nx;
            let mut curve_y = curve * shape;
            if fs.mouth_wave > 0.01 {
                curve_y += fs.mouth_wave * 5.0 * sinf(nx * 6.0 + now * 8.0);
            }
            let upper_y = cy + curve_y - openness * shape;
            let lower_y = cy + curve_y + openness * shape;

            let dist = if openness > 1.0 && upper_y < py && py < lower_y {
                0.0
            } else {
                fminf(fabsf(py - upper_y), fabsf(py - lower_y))
            };

            let alpha = 1.0 - smoothstep(half_thick - 1.0, half_thick + 1.0, dist);
            fb.blend_at(x, y, r, g, b, alpha);
        }
    }
}

// ---- Particles ----

fn render_fire(fb: &mut Framebuffer, fs: &FaceState) {
    for fp in fs.fx.fire_pixels.iter() {
        if !fp.active || fp.life <= 0 {
            continue;
        }
        let x = fp.x as i32;
        let y = fp.y as i32;
        if x < 0 || x >= SCREEN_W || y < 0 || y >= SCREEN_H {
            continue;
        }
        // Palette by heat band.
        let c = if fp.heat > 0.85 {
            framebuffer::rgb(255, 220, 120)
        } else if fp.heat > 0.65 {
            framebuffer::rgb(255, 140, 20)
        } else if fp.heat > 0.40 {
            framebuffer::rgb(220, 50, 0)
        } else {
            framebuffer::rgb(130, 20, 0)
        };
        fb.fill_rect(x - 1, y - 1, 3, 3, c);
    }
}

fn render_sparkles(fb: &mut Framebuffer, fs: &FaceState) {
    let white = framebuffer::rgb(255, 255, 255);
    for sp in fs.fx.sparkle_pixels.iter() {
        if sp.active && sp.life > 0 {
            fb.set(sp.x, sp.y, white);
        }
    }
}

// ---- Calibration screen ----

fn render_calibration(fb: &mut Framebuffer, touch: Option<(i32, i32)>) {
    let bg = framebuffer::rgb(8, 8, 10);
    let grid = framebuffer::rgb(34, 34, 38);
    let axis = framebuffer::rgb(74, 74, 84);

    fb.fill_rect(0, 0, SCREEN_W, SCREEN_H, bg);

    let mut x = 0;
    while x < SCREEN_W {
        fb.vline(x, 0, SCREEN_H - 1, if x % 40 == 0 { axis } else { grid });
        x += 20;
    }
    let mut y = 0;
    while y < SCREEN_H {
        fb.hline(0, SCREEN_W - 1, y, if y % 40 == 0 { axis } else { grid });
        y += 20;
    }
    let mid = framebuffer::rgb(120, 120, 130);
    fb.vline(SCREEN_W / 2, 0, SCREEN_H - 1, mid);
    fb.hline(0, SCREEN_W - 1, SCREEN_H / 2, mid);

    // Corner zone outlines + fill dots.
    let hit = UI_ICON_HITBOX;
    let vis_r = UI_ICON_DIAMETER / 2;
    let ptt_x = UI_ICON_MARGIN;
    let zone_y = SCREEN_H - UI_ICON_MARGIN - hit;
    let action_x = SCREEN_W - UI_ICON_MARGIN - hit;

    let ptt_outline = framebuffer::rgb(34, 180, 102);
    let action_outline = framebuffer::rgb(190, 98, 54);
    for (zx, outline, fill) in [
        (ptt_x, ptt_outline, framebuffer::rgb(20, 96, 64)),
        (action_x, action_outline, framebuffer::rgb(148, 78, 42)),
    ] {
        fb.hline(zx, zx + hit - 1, zone_y, outline);
        fb.hline(zx, zx + hit - 1, zone_y + hit - 1, outline);
        fb.vline(zx, zone_y, zone_y + hit - 1, outline);
        fb.vline(zx + hit - 1, zone_y, zone_y + hit - 1, outline);
        fb.fill_circle(zx + hit / 2, zone_y + hit / 2, vis_r, fill);
    }

    // Touch crosshair.
    if let Some((tx, ty)) = touch {
        let tx = tx.clamp(0, SCREEN_W - 1);
        let ty = ty.clamp(0, SCREEN_H - 1);
        let cross = framebuffer::rgb(240, 250, 255);
        fb.hline(tx - 10, tx + 10, ty, cross);
        fb.vline(tx, ty - 10, ty + 10, cross);
        fb.fill_circle(tx, ty, 4, framebuffer::rgb(255, 228, 128));
    }
}

// ---- Dirty rectangle ----

fn dirty_union(rect: Option<Rectangle>, add: Rectangle) -> Option<Rectangle> {
    let add = framebuffer::clip_to_screen(add);
    if add.size.width == 0 || add.size.height == 0 {
        return rect;
    }
    Some(match rect {
        None => add,
        Some(r) => {
            let x0 = r.top_left.x.min(add.top_left.x);
            let y0 = r.top_left.y.min(add.top_left.y);
            let x1 = (r.top_left.x + r.size.width as i32).max(add.top_left.x + add.size.width as i32);
            let y1 = (r.top_left.y + r.size.height as i32).max(add.top_left.y + add.size.height as i32);
            Rectangle::new(Point::new(x0, y0), Size::new((x1 - x0) as u32, (y1 - y0) as u32))
        }
    })
}

fn compute_dirty_rect(fs: &FaceState, border_active: bool, calibration: bool) -> Rectangle {
    let full = Rectangle::new(Point::zero(), Size::new(SCREEN_W as u32, SCREEN_H as u32));

    // Conservative: these draw anywhere on screen.
    if calibration
        || fs.system.mode != SystemMode::None
        || fs.fx.afterglow
        || fs.anim.rage
        || fs.fx.sparkle
    {
        return full;
    }

    // Central band covering eyes + gaze travel + mouth.
    let mut rect = dirty_union(
        None,
        Rectangle::new(Point::new(12, 0), Size::new((SCREEN_W - 24) as u32, 215)),
    );

    // Border and corner buttons only touch the edge strips.
    if border_active {
        let edge = 20u32;
        rect = dirty_union(rect, Rectangle::new(Point::new(0, 0), Size::new(SCREEN_W as u32, edge)));
        rect = dirty_union(
            rect,
            Rectangle::new(
                Point::new(0, SCREEN_H - edge as i32),
                Size::new(SCREEN_W as u32, edge),
            ),
        );
        rect = dirty_union(
            rect,
            Rectangle::new(Point::new(0, 0), Size::new(edge, SCREEN_H as u32)),
        );
        rect = dirty_union(
            rect,
            Rectangle::new(
                Point::new(SCREEN_W - edge as i32, 0),
                Size::new(edge, SCREEN_H as u32),
            ),
        );
    }

    rect.unwrap_or(full)
}

// ---- Frame renderer ----

/// Per-stage render timings for the heartbeat perf tail (µs).
#[derive(Debug, Default, Clone, Copy)]
pub struct RenderPerf {
    pub render_us: u32,
    pub eyes_us: u32,
    pub mouth_us: u32,
    pub border_us: u32,
    pub effects_us: u32,
    pub overlay_us: u32,
    pub dirty_px: u32,
}

pub struct Renderer {
    fb: Framebuffer,
    afterglow: Afterglow,
    pub calibration: bool,
    pub last_touch: Option<(i32, i32)>,
}

impl Renderer {
    pub fn new() -> Self {
        Self {
            fb: Framebuffer::new(),
            afterglow: Afterglow::new(),
            calibration: FACE_CALIBRATION_MODE,
            last_touch: None,
        }
    }

    pub fn framebuffer(&self) -> &Framebuffer {
        &self.fb
    }

    /// Rasterize one frame. Returns the dirty rectangle to flush; fills
    /// `perf` when `collect_perf` is set (clock returns monotonic µs).
    pub fn render<C: Fn() -> u32>(
        &mut self,
        fs: &FaceState,
        border: &ConvBorder,
        now: f32,
        collect_perf: bool,
        clock: &C,
        perf: &mut RenderPerf,
    ) -> Rectangle {
        let t_start = if collect_perf { clock() } else { 0 };
        let mut t_stage = t_start;
        let mut sample = |out: &mut u32, clock: &C| {
            if collect_perf {
                let now = clock();
                *out = now.wrapping_sub(t_stage);
                t_stage = now;
            }
        };

        self.fb.fill(BG);

        if self.calibration {
            render_calibration(&mut self.fb, self.last_touch);
            sample(&mut perf.overlay_us, clock);
        } else {
            // System drapes have already reshaped the pose; the face always
            // renders, overlays go on top.
            render_eye(&mut self.fb, &fs.eye_l, fs, true, LEFT_EYE_CX, LEFT_EYE_CY);
            render_eye(&mut self.fb, &fs.eye_r, fs, false, RIGHT_EYE_CX, RIGHT_EYE_CY);
            sample(&mut perf.eyes_us, clock);

            render_mouth(&mut self.fb, fs, now);
            sample(&mut perf.mouth_us, clock);

            if fs.anim.rage {
                render_fire(&mut self.fb, fs);
            }
            render_sparkles(&mut self.fb, fs);
            if fs.fx.afterglow {
                self.afterglow.apply(&mut self.fb);
                self.afterglow.capture(&self.fb);
            }
            sample(&mut perf.effects_us, clock);

            match fs.system.mode {
                SystemMode::Error => system_face::render_error_icon(&mut self.fb),
                SystemMode::LowBattery => {
                    system_face::render_battery_icon(&mut self.fb, fs.system.param)
                }
                SystemMode::Updating => {
                    system_face::render_updating_bar(&mut self.fb, fs.system.param)
                }
                _ => {}
            }
            sample(&mut perf.overlay_us, clock);

            // Border + corner buttons are suppressed during system overlays.
            if fs.system.mode == SystemMode::None {
                border.render(&mut self.fb);
                border.render_buttons(&mut self.fb);
            }
            sample(&mut perf.border_us, clock);

            // Keep the shadow in sync even when the trail is off so a later
            // enable doesn't smear a stale frame.
            if !fs.fx.afterglow {
                self.afterglow.capture(&self.fb);
            }
        }

        let dirty = compute_dirty_rect(fs, border.active(), self.calibration);
        perf.dirty_px = dirty.size.width * dirty.size.height;
        if collect_perf {
            perf.render_us = clock().wrapping_sub(t_start);
        }
        dirty
    }
}

impl Default for Renderer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mood::Mood;
    use rand::rngs::SmallRng;
    use rand::SeedableRng;

    fn live_face() -> FaceState {
        let mut fs = FaceState::default();
        fs.fx.boot_active = false;
        fs.fx.sparkle = false;
        fs.anim.autoblink = false;
        fs.anim.idle = false;
        fs.eye_l.openness = 1.0;
        fs.eye_r.openness = 1.0;
        fs.fx.breathing = false;
        fs
    }

    fn render_once(fs: &FaceState, border: &ConvBorder) -> (Renderer, Rectangle, RenderPerf) {
        let mut r = Renderer::new();
        let mut perf = RenderPerf::default();
        let dirty = r.render(fs, border, 10.0, false, &|| 0, &mut perf);
        (r, dirty, perf)
    }

    #[test]
    fn happy_face_paints_eye_color_in_band() {
        let mut fs = live_face();
        let mut rng = SmallRng::seed_from_u64(1);
        fs.set_mood(Mood::Happy);
        fs.advance(10.0, &mut rng);
        // Open eye back up after the advance tween step.
        fs.eye_l.openness = 1.0;
        fs.eye_r.openness = 1.0;
        fs.fx.sparkle = false;

        let border = ConvBorder::new();
        let (r, _, _) = render_once(&fs, &border);
        let expected = framebuffer::rgb(50, 180, 255);
        assert_eq!(r.framebuffer().get(LEFT_EYE_CX as i32, LEFT_EYE_CY as i32), expected);
        assert_eq!(r.framebuffer().get(RIGHT_EYE_CX as i32, RIGHT_EYE_CY as i32), expected);
    }

    #[test]
    fn closed_eye_renders_nothing_at_center() {
        let mut fs = live_face();
        fs.eye_l.openness = 0.0;
        fs.eye_l.height_scale = 0.01;

        let border = ConvBorder::new();
        let (r, _, _) = render_once(&fs, &border);
        assert_eq!(r.framebuffer().get(LEFT_EYE_CX as i32, LEFT_EYE_CY as i32), BG);
        // Right eye unaffected.
        assert_ne!(r.framebuffer().get(RIGHT_EYE_CX as i32, RIGHT_EYE_CY as i32), BG);
    }

    #[test]
    fn mouth_draws_on_centerline() {
        let fs = live_face();
        let border = ConvBorder::new();
        let (r, _, _) = render_once(&fs, &border);
        // Neutral curve 0.2 puts the center of the mouth slightly below
        // MOUTH_CY at the midpoint; scan a small window.
        let mut found = false;
        for y in (MOUTH_CY as i32 - 20)..(MOUTH_CY as i32 + 20) {
            if r.framebuffer().get(MOUTH_CX as i32, y) != BG {
                found = true;
                break;
            }
        }
        assert!(found, "mouth must be visible");
    }

    #[test]
    fn dirty_rect_is_central_band_when_quiet() {
        let fs = live_face();
        let border = ConvBorder::new();
        let (_, dirty, _) = render_once(&fs, &border);
        assert_eq!(dirty.top_left, Point::new(12, 0));
        assert_eq!(dirty.size, Size::new((SCREEN_W - 24) as u32, 215));
    }

    #[test]
    fn dirty_rect_goes_full_screen_for_effects() {
        let mut fs = live_face();
        fs.anim.rage = true;
        let border = ConvBorder::new();
        let (_, dirty, _) = render_once(&fs, &border);
        assert_eq!(dirty.size, Size::new(SCREEN_W as u32, SCREEN_H as u32));
    }

    #[test]
    fn dirty_rect_includes_edges_when_border_active() {
        let fs = live_face();
        let mut border = ConvBorder::new();
        border.set_state(crate::border::ConvState::Listening as u8);
        for _ in 0..10 {
            border.update(1.0 / 30.0);
        }
        assert!(border.active());

        let (_, dirty, _) = render_once(&fs, &border);
        assert_eq!(dirty.top_left, Point::new(0, 0));
        assert_eq!(dirty.size, Size::new(SCREEN_W as u32, SCREEN_H as u32));
    }

    #[test]
    fn afterglow_leaves_fading_trail() {
        let mut fs = live_face();
        fs.fx.afterglow = true;

        let border = ConvBorder::new();
        let mut r = Renderer::new();
        let mut perf = RenderPerf::default();

        // Frame 1: eye at center-left.
        r.render(&fs, &border, 10.0, false, &|| 0, &mut perf);
        let lit = r.framebuffer().get(LEFT_EYE_CX as i32, LEFT_EYE_CY as i32);
        assert_ne!(lit, BG);

        // Frame 2: eye fully shut; the old eye area must show a faded copy.
        fs.eye_l.openness = 0.0;
        fs.eye_l.height_scale = 0.01;
        fs.eye_r.openness = 0.0;
        fs.eye_r.height_scale = 0.01;
        r.render(&fs, &border, 10.033, false, &|| 0, &mut perf);
        let ghost = r.framebuffer().get(LEFT_EYE_CX as i32, LEFT_EYE_CY as i32);
        assert_ne!(ghost, BG, "afterglow must leave a trail");
        assert!(framebuffer::red(ghost) <= framebuffer::red(lit));
        assert!(framebuffer::blue(ghost) < framebuffer::blue(lit));
    }

    #[test]
    fn calibration_screen_replaces_face() {
        let fs = live_face();
        let border = ConvBorder::new();
        let mut r = Renderer::new();
        r.calibration = true;
        r.last_touch = Some((100, 100));
        let mut perf = RenderPerf::default();
        let dirty = r.render(&fs, &border, 0.0, false, &|| 0, &mut perf);

        assert_eq!(dirty.size, Size::new(SCREEN_W as u32, SCREEN_H as u32));
        // Grid background instead of black.
        assert_eq!(r.framebuffer().get(5, 5), framebuffer::rgb(8, 8, 10));
    }

    #[test]
    fn x_eyes_draw_cross_instead_of_eye_body() {
        let mut fs = live_face();
        fs.anim.x_eyes = true;
        fs.fx.sparkle = false;

        // x_eyes forces full-screen dirty? No: only rage/sparkle/afterglow.
        let border = ConvBorder::new();
        let (r, _, _) = render_once(&fs, &border);
        // Center of the X is colored; the rounded-rect corner region is not.
        assert_ne!(r.framebuffer().get(LEFT_EYE_CX as i32, LEFT_EYE_CY as i32), BG);
        let corner_x = (LEFT_EYE_CX - EYE_WIDTH / 2.0) as i32 + 2;
        let corner_y = (LEFT_EYE_CY - EYE_HEIGHT / 2.0) as i32 + 2;
        assert_eq!(r.framebuffer().get(corner_x, corner_y), BG);
    }
}
