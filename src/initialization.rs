use std::fmt::Display;

use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Initialization {
    ///-1 to 1
    Random,
    ///Glorot uniform: `±sqrt(6/(inputs+outputs))`
    #[serde(alias = "glorot")]
    Xavier,
    ///`±sqrt(6/inputs)`, suits relu layers
    He,
    Fixed(f32),
}

pub fn calc_initialization(typ: Initialization, inputs: usize, outputs: usize) -> f32 {
    match typ {
        Initialization::Random => fastrand::f32() * 2. - 1.,
        Initialization::Xavier => {
            let limit = (6.0 / (inputs + outputs) as f32).sqrt();
            (fastrand::f32() * 2. - 1.) * limit
        }
        Initialization::He => {
            let limit = (6.0 / inputs as f32).sqrt();
            (fastrand::f32() * 2. - 1.) * limit
        }
        Initialization::Fixed(val) => val,
    }
}

impl Display for Initialization {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Initialization::Random => write!(f, "Random"),
            Initialization::Xavier => write!(f, "Xavier"),
            Initialization::He => write!(f, "He"),
            Initialization::Fixed(v) => write!(f, "Fixed({v})"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn glorot_within_limit() {
        fastrand::seed(4);
        let limit = (6.0f32 / (178 + 64) as f32).sqrt();
        for _ in 0..1000 {
            let w = calc_initialization(Initialization::Xavier, 178, 64);
            assert!(w.abs() <= limit);
        }
    }

    #[test]
    fn fixed_is_fixed() {
        assert_eq!(calc_initialization(Initialization::Fixed(0.5), 3, 3), 0.5);
    }
}
