// Touch ingestion: raw panel events become telemetry samples plus
// press/release/toggle/click synthesis over the corner button zones.

use crate::border::ConvBorder;
use crate::channels::{ButtonSample, TouchSample};
use crate::config::{SCREEN_H, SCREEN_W};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum TouchPhase {
    Press = 0,
    Release = 1,
    Drag = 2,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ButtonId {
    Ptt = 0,
    Action = 1,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ButtonEventKind {
    Press = 0,
    Release = 1,
    Toggle = 2,
    Click = 3,
}

/// Everything one raw touch event produces.
#[derive(Debug, Default)]
pub struct TouchOutput {
    pub touch: Option<TouchSample>,
    pub buttons: [Option<ButtonSample>; 3],
}

pub struct TouchTracker {
    press_x: i32,
    press_y: i32,
    active: bool,
    ptt_listening: bool,
    pub last_x: i32,
    pub last_y: i32,
}

impl TouchTracker {
    pub const fn new() -> Self {
        Self {
            press_x: SCREEN_W / 2,
            press_y: SCREEN_H / 2,
            active: false,
            ptt_listening: false,
            last_x: SCREEN_W / 2,
            last_y: SCREEN_H / 2,
        }
    }

    pub fn touch_active(&self) -> bool {
        self.active
    }

    pub fn ptt_listening(&self) -> bool {
        self.ptt_listening
    }

    fn button(&self, id: ButtonId, kind: ButtonEventKind, timestamp_us: u32) -> ButtonSample {
        ButtonSample {
            button_id: id as u8,
            event_type: kind as u8,
            state: if id == ButtonId::Ptt {
                self.ptt_listening as u8
            } else {
                0
            },
            timestamp_us,
        }
    }

    /// Process one panel event. Corner hit-testing is suppressed while a
    /// system overlay owns the screen.
    pub fn on_touch(
        &mut self,
        phase: TouchPhase,
        x: i32,
        y: i32,
        system_overlay: bool,
        timestamp_us: u32,
    ) -> TouchOutput {
        let mut out = TouchOutput::default();
        let cx = x.clamp(0, SCREEN_W - 1);
        let cy = y.clamp(0, SCREEN_H - 1);

        out.touch = Some(TouchSample {
            event_type: phase as u8,
            x: cx as u16,
            y: cy as u16,
            timestamp_us,
        });

        match phase {
            TouchPhase::Press => {
                self.press_x = cx;
                self.press_y = cy;
                self.active = true;

                if !system_overlay {
                    if ConvBorder::hit_test_left(cx, cy) {
                        out.buttons[0] =
                            Some(self.button(ButtonId::Ptt, ButtonEventKind::Press, timestamp_us));
                    } else if ConvBorder::hit_test_right(cx, cy) {
                        out.buttons[0] = Some(self.button(
                            ButtonId::Action,
                            ButtonEventKind::Press,
                            timestamp_us,
                        ));
                    }
                }
            }
            TouchPhase::Drag => {
                self.active = true;
            }
            TouchPhase::Release => {
                let (px, py) = (self.press_x, self.press_y);
                self.active = false;

                if !system_overlay {
                    if ConvBorder::hit_test_left(px, py) && ConvBorder::hit_test_left(cx, cy) {
                        out.buttons[0] = Some(self.button(
                            ButtonId::Ptt,
                            ButtonEventKind::Release,
                            timestamp_us,
                        ));
                        // Press+release in the same zone toggles PTT.
                        self.ptt_listening = !self.ptt_listening;
                        out.buttons[1] = Some(self.button(
                            ButtonId::Ptt,
                            ButtonEventKind::Toggle,
                            timestamp_us,
                        ));
                    } else if ConvBorder::hit_test_right(px, py) && ConvBorder::hit_test_right(cx, cy)
                    {
                        out.buttons[0] = Some(self.button(
                            ButtonId::Action,
                            ButtonEventKind::Release,
                            timestamp_us,
                        ));
                        out.buttons[1] = Some(self.button(
                            ButtonId::Action,
                            ButtonEventKind::Click,
                            timestamp_us,
                        ));
                    }
                }
            }
        }

        self.last_x = cx;
        self.last_y = cy;
        out
    }
}

impl Default for TouchTracker {
    fn default() -> Self {
        Self::new()
    }
}

// ---- Calibration touch transforms (diagnostic) ----

/// Raw-controller → screen coordinate transform candidates used by the
/// calibration screen to find the correct panel orientation.
#[derive(Debug, Clone, Copy)]
pub struct TouchTransform {
    pub name: &'static str,
    pub x_max: u16,
    pub y_max: u16,
    pub swap_xy: bool,
    pub mirror_x: bool,
    pub mirror_y: bool,
}

pub const TOUCH_TRANSFORM_PRESETS: &[TouchTransform] = &[
    TouchTransform {
        name: "native",
        x_max: 319,
        y_max: 239,
        swap_xy: false,
        mirror_x: false,
        mirror_y: false,
    },
    TouchTransform {
        name: "swap",
        x_max: 239,
        y_max: 319,
        swap_xy: true,
        mirror_x: false,
        mirror_y: false,
    },
    TouchTransform {
        name: "swap-mx",
        x_max: 239,
        y_max: 319,
        swap_xy: true,
        mirror_x: true,
        mirror_y: false,
    },
    TouchTransform {
        name: "mx-my",
        x_max: 319,
        y_max: 239,
        swap_xy: false,
        mirror_x: true,
        mirror_y: true,
    },
];

impl TouchTransform {
    pub fn apply(&self, raw_x: u16, raw_y: u16) -> (i32, i32) {
        let (mut x, mut y, x_max, y_max) = if self.swap_xy {
            (raw_y as i32, raw_x as i32, self.y_max as i32, self.x_max as i32)
        } else {
            (raw_x as i32, raw_y as i32, self.x_max as i32, self.y_max as i32)
        };
        if self.mirror_x {
            x = x_max - x;
        }
        if self.mirror_y {
            y = y_max - y;
        }
        (
            (x * (SCREEN_W - 1) / x_max.max(1)).clamp(0, SCREEN_W - 1),
            (y * (SCREEN_H - 1) / y_max.max(1)).clamp(0, SCREEN_H - 1),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channels::EVENT_NONE;

    const LEFT: (i32, i32) = (10, SCREEN_H - 10);
    const RIGHT: (i32, i32) = (SCREEN_W - 10, SCREEN_H - 10);
    const CENTER: (i32, i32) = (SCREEN_W / 2, SCREEN_H / 2);

    #[test]
    fn ptt_click_toggles_listening() {
        let mut t = TouchTracker::new();
        assert!(!t.ptt_listening());

        let press = t.on_touch(TouchPhase::Press, LEFT.0, LEFT.1, false, 100);
        assert_eq!(press.buttons[0].unwrap().event_type, ButtonEventKind::Press as u8);

        let release = t.on_touch(TouchPhase::Release, LEFT.0, LEFT.1, false, 200);
        assert_eq!(release.buttons[0].unwrap().event_type, ButtonEventKind::Release as u8);
        let toggle = release.buttons[1].unwrap();
        assert_eq!(toggle.event_type, ButtonEventKind::Toggle as u8);
        assert_eq!(toggle.state, 1);
        assert!(t.ptt_listening());

        // Second click toggles back off.
        t.on_touch(TouchPhase::Press, LEFT.0, LEFT.1, false, 300);
        let release = t.on_touch(TouchPhase::Release, LEFT.0, LEFT.1, false, 400);
        assert_eq!(release.buttons[1].unwrap().state, 0);
        assert!(!t.ptt_listening());
    }

    #[test]
    fn action_click_requires_same_zone() {
        let mut t = TouchTracker::new();

        t.on_touch(TouchPhase::Press, RIGHT.0, RIGHT.1, false, 1);
        let rel = t.on_touch(TouchPhase::Release, RIGHT.0, RIGHT.1, false, 2);
        assert_eq!(rel.buttons[1].unwrap().event_type, ButtonEventKind::Click as u8);

        // Press in zone, drag out, release outside: no click.
        t.on_touch(TouchPhase::Press, RIGHT.0, RIGHT.1, false, 3);
        let rel = t.on_touch(TouchPhase::Release, CENTER.0, CENTER.1, false, 4);
        assert!(rel.buttons[0].is_none());
    }

    #[test]
    fn system_overlay_suppresses_buttons_not_touch() {
        let mut t = TouchTracker::new();
        let out = t.on_touch(TouchPhase::Press, LEFT.0, LEFT.1, true, 5);
        assert!(out.buttons[0].is_none());
        let sample = out.touch.unwrap();
        assert_ne!(sample.event_type, EVENT_NONE);
        assert_eq!(sample.x, LEFT.0 as u16);
    }

    #[test]
    fn center_touch_emits_sample_only() {
        let mut t = TouchTracker::new();
        let out = t.on_touch(TouchPhase::Press, CENTER.0, CENTER.1, false, 7);
        assert!(out.touch.is_some());
        assert!(out.buttons.iter().all(|b| b.is_none()));
        assert!(t.touch_active());

        let out = t.on_touch(TouchPhase::Release, CENTER.0, CENTER.1, false, 8);
        assert!(out.touch.is_some());
        assert!(!t.touch_active());
    }

    #[test]
    fn transforms_map_corners() {
        let native = &TOUCH_TRANSFORM_PRESETS[0];
        assert_eq!(native.apply(0, 0), (0, 0));
        assert_eq!(native.apply(319, 239), (SCREEN_W - 1, SCREEN_H - 1));

        let swap = &TOUCH_TRANSFORM_PRESETS[1];
        assert_eq!(swap.apply(0, 319), (SCREEN_W - 1, 0));
    }
}
