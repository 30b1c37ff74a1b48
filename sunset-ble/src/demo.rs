//! Canned color sequences for trying out a lamp

use std::time::Duration;

use clap::ValueEnum;
use sunset_proto::{Brightness, Color};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Routine {
    /// Six basic colors, then white at three brightness levels
    Basic,
    /// Primaries, brightness steps, a fade and random flashes
    Primaries,
    /// Warm to cool white
    Temperature,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Step {
    pub label: &'static str,
    pub color: Color,
    pub brightness: Brightness,
    pub hold: Duration,
}

impl Step {
    fn new(label: &'static str, color: Color, brightness: u8, hold_ms: u64) -> Self {
        Self {
            label,
            color,
            brightness: Brightness::new(brightness),
            hold: Duration::from_millis(hold_ms),
        }
    }
}

const RED: Color = Color::new(255, 0, 0);
const GREEN: Color = Color::new(0, 255, 0);
const BLUE: Color = Color::new(0, 0, 255);
const WARM: Color = Color::new(255, 223, 120);
const COOL: Color = Color::new(220, 235, 255);

const FADE_STEPS: u16 = 10;
const FLASHES: usize = 5;

impl Routine {
    pub fn steps(self) -> Vec<Step> {
        match self {
            Routine::Basic => basic(),
            Routine::Primaries => primaries(),
            Routine::Temperature => temperature(),
        }
    }
}

fn basic() -> Vec<Step> {
    let mut steps = vec![
        Step::new("red", RED, 100, 2000),
        Step::new("green", GREEN, 100, 2000),
        Step::new("blue", BLUE, 100, 2000),
        Step::new("yellow", Color::new(255, 255, 0), 100, 2000),
        Step::new("magenta", Color::new(255, 0, 255), 100, 2000),
        Step::new("cyan", Color::new(0, 255, 255), 100, 2000),
    ];
    for level in [20, 50, 100] {
        steps.push(Step::new("white", Color::WHITE, level, 2000));
    }
    steps
}

fn primaries() -> Vec<Step> {
    let mut steps = vec![
        Step::new("red", RED, 100, 1500),
        Step::new("green", GREEN, 100, 1500),
        Step::new("blue", BLUE, 100, 1500),
    ];

    for level in [100, 75, 50, 25, 10, 5] {
        steps.push(Step::new("white", Color::WHITE, level, 1000));
    }

    for i in 0..=FADE_STEPS {
        let v = (i * 255 / FADE_STEPS) as u8;
        steps.push(Step::new("fade", Color::new(v, v, v), 100, 300));
    }

    for _ in 0..FLASHES {
        let color = Color::new(rand::random(), rand::random(), rand::random());
        steps.push(Step::new("flash", color, 100, 200));
    }

    steps.push(Step::new("white", Color::WHITE, 100, 0));
    steps
}

fn temperature() -> Vec<Step> {
    let mut steps = vec![
        Step::new("warm white", WARM, 100, 2000),
        Step::new("neutral white", Color::WHITE, 100, 2000),
        Step::new("cool white", COOL, 100, 2000),
    ];

    // warm (255,223,120) to cool (220,235,255)
    for i in 0..=FADE_STEPS {
        let r = 255 - 35 * i / FADE_STEPS;
        let g = 223 + 12 * i / FADE_STEPS;
        let b = 120 + 135 * i / FADE_STEPS;
        steps.push(Step::new("shift", Color::new(r as u8, g as u8, b as u8), 100, 500));
    }
    steps
}
