// Conversation border: a state machine over the interaction phase driving
// border alpha/color/motion, corner-button visuals and the status LED.

use libm::{atan2f, expf, fabsf, fmodf, sinf, sqrtf};

use crate::config::{SCREEN_H, SCREEN_W};
use crate::framebuffer::Framebuffer;

// Border geometry
const BORDER_FRAME_W: f32 = 4.0;
const BORDER_GLOW_W: f32 = 3.0;
const BORDER_CORNER_R: f32 = 3.0;
const BORDER_BLEND_RATE: f32 = 8.0;

// ATTENTION animation
const ATTENTION_DURATION: f32 = 0.4;
const ATTENTION_DEPTH: f32 = 20.0;

// LISTENING animation
const LISTENING_BREATH_FREQ: f32 = 1.5;
const LISTENING_ALPHA_BASE: f32 = 0.6;
const LISTENING_ALPHA_MOD: f32 = 0.3;

// PTT animation
const PTT_PULSE_FREQ: f32 = 0.8;
const PTT_ALPHA_BASE: f32 = 0.8;
const PTT_ALPHA_MOD: f32 = 0.1;

// THINKING animation
const THINKING_ORBIT_DOTS: usize = 3;
const THINKING_ORBIT_SPACING: f32 = 0.12;
const THINKING_ORBIT_SPEED: f32 = 0.5;
const THINKING_ORBIT_DOT_R: f32 = 4.0;
const THINKING_BORDER_ALPHA: f32 = 0.3;

// SPEAKING animation
const SPEAKING_ALPHA_BASE: f32 = 0.3;
const SPEAKING_ALPHA_MOD: f32 = 0.7;

// ERROR animation
const ERROR_FLASH_DURATION: f32 = 0.1;
const ERROR_DECAY_RATE: f32 = 5.0;

// DONE animation
const DONE_FADE_SPEED: f32 = 2.0;

// LED scaling
const LED_SCALE: f32 = 0.16;

// Corner button zones
const BTN_CORNER_W: i32 = 60;
const BTN_CORNER_H: i32 = 46;
const BTN_CORNER_INNER_R: f32 = 8.0;
const BTN_ICON_SIZE: f32 = 18.0;

const BTN_ZONE_Y_TOP: i32 = SCREEN_H - BTN_CORNER_H;
const BTN_LEFT_ZONE_X1: i32 = BTN_CORNER_W;
const BTN_RIGHT_ZONE_X0: i32 = SCREEN_W - BTN_CORNER_W;

const TWO_PI: f32 = 2.0 * core::f32::consts::PI;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum ConvState {
    #[default]
    Idle = 0,
    Attention = 1,
    Listening = 2,
    Ptt = 3,
    Thinking = 4,
    Speaking = 5,
    Error = 6,
    Done = 7,
}

impl ConvState {
    pub fn from_u8(v: u8) -> Option<Self> {
        Some(match v {
            0 => Self::Idle,
            1 => Self::Attention,
            2 => Self::Listening,
            3 => Self::Ptt,
            4 => Self::Thinking,
            5 => Self::Speaking,
            6 => Self::Error,
            7 => Self::Done,
            _ => return None,
        })
    }

    fn color(self) -> (f32, f32, f32) {
        match self {
            ConvState::Idle | ConvState::Done => (0.0, 0.0, 0.0),
            ConvState::Attention => (180.0, 240.0, 255.0),
            ConvState::Listening => (0.0, 200.0, 220.0),
            ConvState::Ptt => (255.0, 200.0, 80.0),
            ConvState::Thinking => (120.0, 100.0, 255.0),
            ConvState::Speaking => (200.0, 240.0, 255.0),
            ConvState::Error => (255.0, 160.0, 60.0),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BtnIcon {
    #[default]
    None,
    Mic,
    XMark,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BtnState {
    #[default]
    Idle,
    Active,
    Pressed,
}

#[derive(Debug, Clone, Copy, Default)]
struct ButtonZone {
    icon: BtnIcon,
    state: BtnState,
    color: (u8, u8, u8),
    flash_timer: f32,
}

fn clampf(v: f32, lo: f32, hi: f32) -> f32 {
    if v < lo {
        lo
    } else if v > hi {
        hi
    } else {
        v
    }
}

fn lerp(a: f32, b: f32, t: f32) -> f32 {
    a + (b - a) * t
}

// Signed distance to the inner border frame (rounded rect).
fn inner_sdf(px: f32, py: f32) -> f32 {
    let cx = SCREEN_W as f32 / 2.0;
    let cy = SCREEN_H as f32 / 2.0;
    let inner_hw = cx - BORDER_FRAME_W;
    let inner_hh = cy - BORDER_FRAME_W;
    let r = BORDER_CORNER_R;
    let dx = fabsf(px - cx) - inner_hw + r;
    let dy = fabsf(py - cy) - inner_hh + r;
    let mx = if dx > 0.0 { dx } else { 0.0 };
    let my = if dy > 0.0 { dy } else { 0.0 };
    let outside = sqrtf(mx * mx + my * my);
    let inside = if dx > dy { dx } else { dy };
    (if inside < 0.0 { inside } else { 0.0 }) + outside - r
}

// Walk the frame perimeter; t in [0,1) maps to an (x, y) point.
fn perimeter_xy(t: f32) -> (f32, f32) {
    let inset = BORDER_FRAME_W / 2.0;
    let w = SCREEN_W as f32 - 2.0 * inset;
    let h = SCREEN_H as f32 - 2.0 * inset;
    let perim = 2.0 * (w + h);
    let mut d = fmodf(t, 1.0);
    if d < 0.0 {
        d += 1.0;
    }
    d *= perim;
    if d < w {
        return (inset + d, inset);
    }
    d -= w;
    if d < h {
        return (inset + w, inset + d);
    }
    d -= h;
    if d < w {
        return (inset + w - d, inset + h);
    }
    d -= w;
    (inset, inset + h - d)
}

fn sd_rounded_box(px: f32, py: f32, cx: f32, cy: f32, hw: f32, hh: f32, r: f32) -> f32 {
    let dx = fabsf(px - cx) - hw + r;
    let dy = fabsf(py - cy) - hh + r;
    let mx = if dx > 0.0 { dx } else { 0.0 };
    let my = if dy > 0.0 { dy } else { 0.0 };
    let inside = if dx > dy { dx } else { dy };
    (if inside < 0.0 { inside } else { 0.0 }) + sqrtf(mx * mx + my * my) - r
}

// Inverted smoothstep coverage across an SDF edge.
fn sdf_alpha(dist: f32, aa_width: f32) -> f32 {
    let edge0 = -aa_width / 2.0;
    let edge1 = aa_width / 2.0;
    let t = clampf((dist - edge0) / (edge1 - edge0), 0.0, 1.0);
    1.0 - t * t * (3.0 - 2.0 * t)
}

pub struct ConvBorder {
    state: ConvState,
    timer: f32,
    alpha: f32,
    color: (f32, f32, f32),
    orbit_pos: f32,
    energy: f32,
    led: (u8, u8, u8),
    btn_left: ButtonZone,
    btn_right: ButtonZone,
}

impl ConvBorder {
    pub fn new() -> Self {
        Self {
            state: ConvState::Idle,
            timer: 0.0,
            alpha: 0.0,
            color: (0.0, 0.0, 0.0),
            orbit_pos: 0.0,
            energy: 0.0,
            led: (0, 0, 0),
            btn_left: ButtonZone {
                icon: BtnIcon::Mic,
                ..Default::default()
            },
            btn_right: ButtonZone {
                icon: BtnIcon::XMark,
                ..Default::default()
            },
        }
    }

    pub fn state(&self) -> ConvState {
        self.state
    }

    pub fn set_state(&mut self, raw: u8) {
        let Some(state) = ConvState::from_u8(raw) else {
            log::debug!("unknown conv state {}", raw);
            return;
        };
        if state == self.state {
            return;
        }
        self.state = state;
        self.timer = 0.0;

        // Instant-response states snap their color; the rest blend in update.
        if matches!(state, ConvState::Attention | ConvState::Error) {
            self.color = state.color();
        }

        // Corner buttons track the conversation phase.
        let c = state.color();
        let c8 = (c.0 as u8, c.1 as u8, c.2 as u8);
        match state {
            ConvState::Ptt | ConvState::Listening => {
                self.set_button_left(BtnIcon::Mic, BtnState::Active, c8);
                self.set_button_right(BtnIcon::XMark, BtnState::Active, c8);
            }
            ConvState::Thinking | ConvState::Speaking => {
                self.set_button_left(BtnIcon::Mic, BtnState::Idle, (0, 0, 0));
                self.set_button_right(BtnIcon::XMark, BtnState::Active, c8);
            }
            _ => {
                self.set_button_left(BtnIcon::Mic, BtnState::Idle, (0, 0, 0));
                self.set_button_right(BtnIcon::XMark, BtnState::Idle, (0, 0, 0));
            }
        }
    }

    /// Talking energy feed for SPEAKING reactivity.
    pub fn set_energy(&mut self, energy: f32) {
        self.energy = clampf(energy, 0.0, 1.0);
    }

    pub fn set_button_left(&mut self, icon: BtnIcon, state: BtnState, color: (u8, u8, u8)) {
        self.btn_left.icon = icon;
        self.btn_left.state = state;
        self.btn_left.color = color;
        if state == BtnState::Pressed {
            self.btn_left.flash_timer = 0.15;
        }
    }

    pub fn set_button_right(&mut self, icon: BtnIcon, state: BtnState, color: (u8, u8, u8)) {
        self.btn_right.icon = icon;
        self.btn_right.state = state;
        self.btn_right.color = color;
        if state == BtnState::Pressed {
            self.btn_right.flash_timer = 0.15;
        }
    }

    pub fn hit_test_left(x: i32, y: i32) -> bool {
        x >= 0 && x < BTN_LEFT_ZONE_X1 && y >= BTN_ZONE_Y_TOP && y < SCREEN_H
    }

    pub fn hit_test_right(x: i32, y: i32) -> bool {
        x >= BTN_RIGHT_ZONE_X0 && x < SCREEN_W && y >= BTN_ZONE_Y_TOP && y < SCREEN_H
    }

    /// Advance the animation by `dt` seconds (call every frame).
    pub fn update(&mut self, dt: f32) {
        let blend_t = if dt * BORDER_BLEND_RATE < 1.0 {
            dt * BORDER_BLEND_RATE
        } else {
            1.0
        };
        let target_color = self.state.color();

        match self.state {
            ConvState::Idle => {
                self.alpha = clampf(self.alpha - dt * BORDER_BLEND_RATE, 0.0, 1.0);
            }
            ConvState::Attention => {
                if self.timer < ATTENTION_DURATION {
                    self.alpha = 1.0;
                    self.color = target_color;
                }
            }
            ConvState::Listening => {
                let target = LISTENING_ALPHA_BASE
                    + LISTENING_ALPHA_MOD * sinf(self.timer * TWO_PI * LISTENING_BREATH_FREQ);
                self.alpha += (target - self.alpha) * blend_t;
                self.blend_color(target_color, blend_t);
            }
            ConvState::Ptt => {
                let target =
                    PTT_ALPHA_BASE + PTT_ALPHA_MOD * sinf(self.timer * TWO_PI * PTT_PULSE_FREQ);
                self.alpha += (target - self.alpha) * blend_t;
                self.blend_color(target_color, blend_t);
            }
            ConvState::Thinking => {
                self.alpha += (THINKING_BORDER_ALPHA - self.alpha) * blend_t;
                self.blend_color(target_color, blend_t);
                self.orbit_pos = fmodf(self.orbit_pos + THINKING_ORBIT_SPEED * dt, 1.0);
            }
            ConvState::Speaking => {
                let target = SPEAKING_ALPHA_BASE + SPEAKING_ALPHA_MOD * self.energy;
                self.alpha += (target - self.alpha) * blend_t;
                self.blend_color(target_color, blend_t);
            }
            ConvState::Error => {
                if self.timer < ERROR_FLASH_DURATION {
                    self.alpha = 1.0;
                    self.color = target_color;
                } else {
                    self.alpha = expf(-(self.timer - ERROR_FLASH_DURATION) * ERROR_DECAY_RATE);
                }
            }
            ConvState::Done => {
                self.alpha = clampf(self.alpha - dt * DONE_FADE_SPEED, 0.0, 1.0);
            }
        }

        // LED mirrors the border at reduced brightness.
        self.led = if self.alpha > 0.01 {
            let ls = self.alpha * LED_SCALE;
            (
                clampf(self.color.0 * ls, 0.0, 255.0) as u8,
                clampf(self.color.1 * ls, 0.0, 255.0) as u8,
                clampf(self.color.2 * ls, 0.0, 255.0) as u8,
            )
        } else {
            (0, 0, 0)
        };

        // Button press-flash decay.
        for btn in [&mut self.btn_left, &mut self.btn_right] {
            if btn.flash_timer > 0.0 {
                btn.flash_timer -= dt;
                if btn.flash_timer <= 0.0 && btn.state == BtnState::Pressed {
                    btn.state = BtnState::Active;
                }
            }
        }

        self.timer += dt;
    }

    fn blend_color(&mut self, target: (f32, f32, f32), t: f32) {
        self.color.0 = lerp(self.color.0, target.0, t);
        self.color.1 = lerp(self.color.1, target.1, t);
        self.color.2 = lerp(self.color.2, target.2, t);
    }

    pub fn led(&self) -> (u8, u8, u8) {
        self.led
    }

    pub fn active(&self) -> bool {
        self.alpha > 0.01
    }

    // ---- Rendering ----

    fn frame_px(&self, fb: &mut Framebuffer, x: i32, y: i32) {
        let d = inner_sdf(x as f32 + 0.5, y as f32 + 0.5);
        let a = if d > 0.0 {
            self.alpha
        } else if d > -BORDER_GLOW_W {
            let t = (d + BORDER_GLOW_W) / BORDER_GLOW_W;
            self.alpha * t * t
        } else {
            return;
        };
        fb.blend_at(
            x,
            y,
            self.color.0 as u8,
            self.color.1 as u8,
            self.color.2 as u8,
            a,
        );
    }

    fn render_attention(&self, fb: &mut Framebuffer) {
        let progress = self.timer / ATTENTION_DURATION;
        let sweep = ATTENTION_DEPTH * progress;
        let fade_global = 1.0 - progress * 0.5;
        let limit = sweep as i32 + 1;
        let (cr, cg, cb) = ConvState::Attention.color();
        let (cr, cg, cb) = (cr as u8, cg as u8, cb as u8);

        let mut edge = |fb: &mut Framebuffer, x: i32, y: i32, dist: f32| {
            if dist < sweep {
                let denom = if sweep > 1.0 { sweep } else { 1.0 };
                let f = (1.0 - dist / denom) * fade_global;
                fb.blend_at(x, y, cr, cg, cb, f * f);
            }
        };

        for y in 0..SCREEN_H {
            let dv = y.min(SCREEN_H - 1 - y);
            if dv > limit {
                // Middle rows: only left/right edges.
                for x in 0..limit.min(SCREEN_W) {
                    edge(fb, x, y, x as f32);
                }
                for x in (SCREEN_W - limit).max(0)..SCREEN_W {
                    edge(fb, x, y, (SCREEN_W - 1 - x) as f32);
                }
            } else {
                for x in 0..SCREEN_W {
                    let dh = x.min(SCREEN_W - 1 - x);
                    edge(fb, x, y, dh.min(dv) as f32);
                }
            }
        }
    }

    fn render_dots(&self, fb: &mut Framebuffer) {
        const BRIGHTNESS: [f32; THINKING_ORBIT_DOTS] = [1.0, 0.7, 0.4];
        let (dr, dg, db) = ConvState::Thinking.color();
        let r = THINKING_ORBIT_DOT_R;

        for (i, bri) in BRIGHTNESS.iter().enumerate() {
            let mut pos = fmodf(self.orbit_pos - i as f32 * THINKING_ORBIT_SPACING, 1.0);
            if pos < 0.0 {
                pos += 1.0;
            }
            let (dx, dy) = perimeter_xy(pos);

            let cr = clampf(dr * bri, 0.0, 255.0) as u8;
            let cg = clampf(dg * bri, 0.0, 255.0) as u8;
            let cb = clampf(db * bri, 0.0, 255.0) as u8;

            let x0 = (dx - r - 1.0).max(0.0) as i32;
            let x1 = ((dx + r + 2.0) as i32).min(SCREEN_W);
            let y0 = (dy - r - 1.0).max(0.0) as i32;
            let y1 = ((dy + r + 2.0) as i32).min(SCREEN_H);

            for y in y0..y1 {
                for x in x0..x1 {
                    let ddx = x as f32 + 0.5 - dx;
                    let ddy = y as f32 + 0.5 - dy;
                    let d = sqrtf(ddx * ddx + ddy * ddy);
                    if d < r {
                        let ratio = d / r;
                        let a = ((1.0 - ratio * ratio) * 2.5).min(1.0);
                        fb.blend_at(x, y, cr, cg, cb, a);
                    }
                }
            }
        }
    }

    /// Frame + glow overlay.
    pub fn render(&self, fb: &mut Framebuffer) {
        if self.alpha < 0.01 && self.state != ConvState::Attention {
            return;
        }

        if self.state == ConvState::Attention && self.timer < ATTENTION_DURATION {
            self.render_attention(fb);
            return;
        }

        let depth = (BORDER_FRAME_W + BORDER_GLOW_W) as i32;
        for y in 0..SCREEN_H {
            let dv = y.min(SCREEN_H - 1 - y);
            if dv >= depth {
                for x in 0..depth {
                    self.frame_px(fb, x, y);
                }
                for x in SCREEN_W - depth..SCREEN_W {
                    self.frame_px(fb, x, y);
                }
            } else {
                for x in 0..SCREEN_W {
                    self.frame_px(fb, x, y);
                }
            }
        }

        if self.state == ConvState::Thinking && self.alpha > 0.01 {
            self.render_dots(fb);
        }
    }

    /// Corner button zones + icons.
    pub fn render_buttons(&self, fb: &mut Framebuffer) {
        if self.btn_left.icon != BtnIcon::None {
            self.render_corner_zone(fb, true, &self.btn_left);
        }
        if self.btn_right.icon != BtnIcon::None {
            self.render_corner_zone(fb, false, &self.btn_right);
        }
    }

    fn render_corner_zone(&self, fb: &mut Framebuffer, is_left: bool, btn: &ButtonZone) {
        const IDLE_BG: (u8, u8, u8) = (40, 44, 52);
        const IDLE_BORDER: (u8, u8, u8) = (80, 90, 100);
        const IDLE_ALPHA: f32 = 0.35;
        const ICON_COLOR: (u8, u8, u8) = (200, 210, 220);

        let boost = |c: u8, f: f32| clampf(c as f32 * f, 0.0, 255.0) as u8;

        let (bg, bg_alpha, brd, ico) = if btn.state == BtnState::Pressed || btn.flash_timer > 0.0 {
            (
                (boost(btn.color.0, 1.3), boost(btn.color.1, 1.3), boost(btn.color.2, 1.3)),
                0.75,
                (255, 255, 255),
                (255, 255, 255),
            )
        } else if btn.state == BtnState::Active {
            (
                btn.color,
                0.55,
                (boost(btn.color.0, 1.2), boost(btn.color.1, 1.2), boost(btn.color.2, 1.2)),
                (255, 255, 255),
            )
        } else {
            (IDLE_BG, IDLE_ALPHA, IDLE_BORDER, ICON_COLOR)
        };

        let x0 = if is_left { 0 } else { BTN_RIGHT_ZONE_X0 };
        let x1 = if is_left { BTN_LEFT_ZONE_X1 } else { SCREEN_W };
        let r = BTN_CORNER_INNER_R;
        let rcx = if is_left {
            (BTN_LEFT_ZONE_X1 as f32) - r
        } else {
            (BTN_RIGHT_ZONE_X0 as f32) + r
        };
        let rcy = BTN_ZONE_Y_TOP as f32 + r;

        for y in BTN_ZONE_Y_TOP..SCREEN_H {
            for x in x0..x1 {
                let px = x as f32 + 0.5;
                let py = y as f32 + 0.5;

                let in_corner_quad = if is_left {
                    px > rcx && py < rcy
                } else {
                    px < rcx && py < rcy
                };
                if in_corner_quad {
                    let ddx = px - rcx;
                    let ddy = py - rcy;
                    let dist = sqrtf(ddx * ddx + ddy * ddy);
                    if dist > r + 0.5 {
                        continue;
                    }
                    if dist > r - 0.5 {
                        let a = bg_alpha * clampf(r + 0.5 - dist, 0.0, 1.0);
                        fb.blend_at(x, y, bg.0, bg.1, bg.2, a);
                        let ba = clampf(1.0 - fabsf(dist - r), 0.0, 1.0) * 0.6;
                        fb.blend_at(x, y, brd.0, brd.1, brd.2, ba);
                        continue;
                    }
                }

                fb.blend_at(x, y, bg.0, bg.1, bg.2, bg_alpha);

                // Thin border on the zone's inner edges.
                let on_top = y == BTN_ZONE_Y_TOP && !in_corner_quad;
                let on_inner_side = (is_left && x == x1 - 1) || (!is_left && x == x0);
                if on_inner_side && py >= rcy {
                    fb.blend_at(x, y, brd.0, brd.1, brd.2, 0.6);
                } else if on_top {
                    let valid = if is_left { px <= rcx } else { px >= rcx };
                    if valid {
                        fb.blend_at(x, y, brd.0, brd.1, brd.2, 0.6);
                    }
                }
            }
        }

        let icx = if is_left {
            (BTN_CORNER_W / 2) as f32
        } else {
            (SCREEN_W - BTN_CORNER_W / 2) as f32
        };
        let icy = (SCREEN_H - BTN_CORNER_H / 2) as f32;
        match btn.icon {
            BtnIcon::Mic => self.render_mic_icon(fb, icx, icy, ico, btn.state != BtnState::Idle),
            BtnIcon::XMark => render_x_icon(fb, icx, icy, ico),
            BtnIcon::None => {}
        }
    }

    fn render_mic_icon(&self, fb: &mut Framebuffer, icx: f32, icy: f32, ico: (u8, u8, u8), active: bool) {
        let sz = BTN_ICON_SIZE;
        let mic_cx = icx - sz * 0.22;
        let body_hw = sz * 0.19;
        let body_hh = sz * 0.39;
        let base_y = icy + sz * 0.5;
        let arc_radii = [sz * 0.44, sz * 0.67, sz * 0.89];
        let arc_thick = sz * 0.072;
        let arc_min = -70.0 * core::f32::consts::PI / 180.0;
        let arc_max = 70.0 * core::f32::consts::PI / 180.0;

        let ix0 = (icx - sz - 1.0).max(0.0) as i32;
        let ix1 = ((icx + sz + 1.0) as i32).min(SCREEN_W);
        let iy0 = (icy - sz - 1.0).max(0.0) as i32;
        let iy1 = ((icy + sz + 1.0) as i32).min(SCREEN_H);

        for y in iy0..iy1 {
            for x in ix0..ix1 {
                let px = x as f32 + 0.5;
                let py = y as f32 + 0.5;

                // Capsule body.
                let d_body = sd_rounded_box(px, py, mic_cx, icy, body_hw, body_hh, body_hw);
                let a_body = sdf_alpha(d_body, 1.0);
                if a_body > 0.01 {
                    fb.blend_at(x, y, ico.0, ico.1, ico.2, a_body * 0.9);
                    continue;
                }

                // Base bar.
                let d_base = sd_rounded_box(px, py, mic_cx, base_y, sz * 0.22, sz * 0.06, 0.5);
                let a_base = sdf_alpha(d_base, 1.0);
                if a_base > 0.01 {
                    fb.blend_at(x, y, ico.0, ico.1, ico.2, a_base * 0.7);
                    continue;
                }

                // Sound-wave arcs on the right side; the active state makes
                // them travel outward.
                let dx = px - mic_cx;
                let dy = py - icy;
                let dist = sqrtf(dx * dx + dy * dy);
                let angle = atan2f(dy, dx);
                if angle >= arc_min && angle <= arc_max {
                    for &radius in arc_radii.iter() {
                        let ad = fabsf(dist - radius);
                        if ad < arc_thick {
                            let mut a = 1.0 - ad / arc_thick;
                            if active {
                                let phase = fmodf(self.timer * 3.0 - radius / (sz * 0.78), 1.0);
                                let s = sinf(phase * core::f32::consts::PI);
                                a *= 0.5 + 0.5 * (if s > 0.0 { s } else { 0.0 });
                            }
                            fb.blend_at(x, y, ico.0, ico.1, ico.2, a * 0.9);
                            break;
                        }
                    }
                }
            }
        }
    }
}

fn render_x_icon(fb: &mut Framebuffer, icx: f32, icy: f32, ico: (u8, u8, u8)) {
    let sz = BTN_ICON_SIZE;
    let arm = sz * 0.5;
    let thick = sz * 0.14;

    let ix0 = (icx - arm - 2.0).max(0.0) as i32;
    let ix1 = ((icx + arm + 2.0) as i32).min(SCREEN_W);
    let iy0 = (icy - arm - 2.0).max(0.0) as i32;
    let iy1 = ((icy + arm + 2.0) as i32).min(SCREEN_H);

    for y in iy0..iy1 {
        for x in ix0..ix1 {
            let px = x as f32 + 0.5;
            let py = y as f32 + 0.5;
            // 45-degree rotation into the mark's frame.
            let rx = (px - icx) * 0.707 - (py - icy) * 0.707;
            let ry = (px - icx) * 0.707 + (py - icy) * 0.707;
            let d1 = sd_rounded_box(rx, ry, 0.0, 0.0, thick, arm, 1.0);
            let d2 = sd_rounded_box(rx, ry, 0.0, 0.0, arm, thick, 1.0);
            let d = if d1 < d2 { d1 } else { d2 };
            let a = sdf_alpha(d, 1.0);
            fb.blend_at(x, y, ico.0, ico.1, ico.2, a * 0.9);
        }
    }
}

impl Default for ConvBorder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DT: f32 = 1.0 / 30.0;

    #[test]
    fn attention_sweeps_then_listening_breathes() {
        let mut b = ConvBorder::new();
        b.set_state(ConvState::Attention as u8);
        b.update(DT);
        assert_eq!(b.alpha, 1.0);
        assert!(b.active());

        // 0.5 s later: LISTENING settles into a sinusoidal alpha around
        // the breathing base.
        for _ in 0..15 {
            b.update(DT);
        }
        b.set_state(ConvState::Listening as u8);
        let mut lo = f32::MAX;
        let mut hi = f32::MIN;
        for _ in 0..90 {
            b.update(DT);
            lo = lo.min(b.alpha);
            hi = hi.max(b.alpha);
        }
        assert!(lo > LISTENING_ALPHA_BASE - LISTENING_ALPHA_MOD - 0.15);
        assert!(hi < LISTENING_ALPHA_BASE + LISTENING_ALPHA_MOD + 0.15);
        assert!(hi - lo > 0.2, "alpha must oscillate, got {lo}..{hi}");
    }

    #[test]
    fn error_flashes_then_decays() {
        let mut b = ConvBorder::new();
        b.set_state(ConvState::Error as u8);
        b.update(DT);
        assert_eq!(b.alpha, 1.0);

        for _ in 0..60 {
            b.update(DT);
        }
        assert!(b.alpha < 0.01, "error border must decay, got {}", b.alpha);
    }

    #[test]
    fn done_fades_to_zero() {
        let mut b = ConvBorder::new();
        b.set_state(ConvState::Ptt as u8);
        for _ in 0..30 {
            b.update(DT);
        }
        assert!(b.active());

        b.set_state(ConvState::Done as u8);
        for _ in 0..30 {
            b.update(DT);
        }
        assert!(!b.active());
        assert_eq!(b.led(), (0, 0, 0));
    }

    #[test]
    fn speaking_alpha_follows_energy() {
        let mut b = ConvBorder::new();
        b.set_state(ConvState::Speaking as u8);
        b.set_energy(0.0);
        for _ in 0..60 {
            b.update(DT);
        }
        let quiet = b.alpha;

        b.set_energy(1.0);
        for _ in 0..60 {
            b.update(DT);
        }
        assert!(b.alpha > quiet + 0.3);
    }

    #[test]
    fn led_mirrors_border_color_scaled() {
        let mut b = ConvBorder::new();
        b.set_state(ConvState::Ptt as u8);
        for _ in 0..60 {
            b.update(DT);
        }
        let (r, g, _) = b.led();
        // PTT is warm amber; scaled by alpha * LED_SCALE.
        assert!(r > 0);
        assert!(r >= g);
        assert!(r < 80, "LED must be dimmed, got {r}");
    }

    #[test]
    fn hit_zones_are_the_bottom_corners() {
        assert!(ConvBorder::hit_test_left(5, SCREEN_H - 5));
        assert!(!ConvBorder::hit_test_left(SCREEN_W - 5, SCREEN_H - 5));
        assert!(ConvBorder::hit_test_right(SCREEN_W - 5, SCREEN_H - 5));
        assert!(!ConvBorder::hit_test_right(5, 5));
    }

    #[test]
    fn render_touches_only_edges_in_steady_state() {
        let mut b = ConvBorder::new();
        b.set_state(ConvState::Listening as u8);
        for _ in 0..30 {
            b.update(DT);
        }

        let mut fb = Framebuffer::new();
        b.render(&mut fb);
        // Center untouched, border band colored.
        assert_eq!(fb.get(SCREEN_W / 2, SCREEN_H / 2), 0);
        assert_ne!(fb.get(1, SCREEN_H / 2), 0);
        assert_ne!(fb.get(SCREEN_W / 2, 1), 0);
    }
}
