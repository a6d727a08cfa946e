//! Named filter presets.
//!
//! The table the CLI exposes: blur/edge/emboss-style kernels, plus a `+`
//! syntax that composes any two presets into a single pass
//! (e.g. `blur+gaussian-blur`).

use super::Kernel;
use crate::core::error::{KernelError, KernelResult};

/// Name and description of a filter preset.
#[derive(Debug, Clone, Copy)]
pub struct PresetInfo {
    /// The name accepted by [`by_name`].
    pub name: &'static str,
    /// Human-readable description.
    pub description: &'static str,
}

/// All base presets, in listing order.
pub const PRESETS: &[PresetInfo] = &[
    PresetInfo {
        name: "identity",
        description: "Identity filter (no effect).",
    },
    PresetInfo {
        name: "fast-blur",
        description: "Fast blur filter (3x3 kernel).",
    },
    PresetInfo {
        name: "blur",
        description: "Standard blur filter (5x5 kernel).",
    },
    PresetInfo {
        name: "gaussian-blur",
        description: "Gaussian blur filter (5x5 kernel).",
    },
    PresetInfo {
        name: "motion-blur",
        description: "Motion blur filter (9x9 kernel).",
    },
    PresetInfo {
        name: "edge-detect",
        description: "Edge detection filter (3x3 kernel).",
    },
    PresetInfo {
        name: "emboss",
        description: "Emboss filter (5x5 kernel).",
    },
];

#[rustfmt::skip]
const FAST_BLUR: [f64; 9] = [
    0.0, 0.2, 0.0,
    0.2, 0.2, 0.2,
    0.0, 0.2, 0.0,
];

#[rustfmt::skip]
const BLUR: [f64; 25] = [
    0.0, 0.0, 1.0, 0.0, 0.0,
    0.0, 1.0, 1.0, 1.0, 0.0,
    1.0, 1.0, 1.0, 1.0, 1.0,
    0.0, 1.0, 1.0, 1.0, 0.0,
    0.0, 0.0, 1.0, 0.0, 0.0,
];

#[rustfmt::skip]
const GAUSSIAN_BLUR: [f64; 25] = [
    1.0,  4.0,  6.0,  4.0, 1.0,
    4.0, 16.0, 24.0, 16.0, 4.0,
    6.0, 24.0, 36.0, 24.0, 6.0,
    4.0, 16.0, 24.0, 16.0, 4.0,
    1.0,  4.0,  6.0,  4.0, 1.0,
];

#[rustfmt::skip]
const EDGE_DETECT: [f64; 9] = [
    -1.0, -1.0, -1.0,
    -1.0,  8.0, -1.0,
    -1.0, -1.0, -1.0,
];

#[rustfmt::skip]
const EMBOSS: [f64; 25] = [
    -1.0, -1.0, -1.0, -1.0, 0.0,
    -1.0, -1.0, -1.0,  0.0, 1.0,
    -1.0, -1.0,  0.0,  1.0, 1.0,
    -1.0,  0.0,  1.0,  1.0, 1.0,
     0.0,  1.0,  1.0,  1.0, 1.0,
];

fn motion_blur_weights() -> Vec<f64> {
    let mut values = vec![0.0; 81];
    for i in 0..9 {
        values[i * 9 + i] = 1.0;
    }
    values
}

/// Look up a preset kernel by name.
///
/// A name containing `+` composes the named presets left to right into one
/// equivalent kernel (`a+b` is "apply `a`, then `b`, in a single pass").
pub fn by_name(name: &str) -> KernelResult<Kernel> {
    if name.contains('+') {
        let mut composed: Option<Kernel> = None;
        for part in name.split('+') {
            let next = base_by_name(part)?;
            composed = Some(match composed {
                Some(k) => k.compose(&next)?,
                None => next,
            });
        }
        // split('+') yields at least one part, so this is always Some.
        return composed.ok_or_else(|| KernelError::UnknownPreset(name.to_string()));
    }
    base_by_name(name)
}

fn base_by_name(name: &str) -> KernelResult<Kernel> {
    match name {
        "identity" => Kernel::identity(3),
        "fast-blur" => Kernel::new(3, 1.0, 0.0, &FAST_BLUR),
        "blur" => Kernel::new(5, 1.0 / 13.0, 0.0, &BLUR),
        "gaussian-blur" => Kernel::new(5, 1.0 / 256.0, 0.0, &GAUSSIAN_BLUR),
        "motion-blur" => Kernel::new(9, 1.0 / 9.0, 0.0, &motion_blur_weights()),
        "edge-detect" => Kernel::new(3, 1.0, 0.0, &EDGE_DETECT),
        "emboss" => Kernel::new(5, 1.0, 128.0, &EMBOSS),
        _ => Err(KernelError::UnknownPreset(name.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_listed_presets_resolve() {
        for info in PRESETS {
            let kernel = by_name(info.name).unwrap();
            assert!(kernel.size() % 2 == 1, "{} has even size", info.name);
        }
    }

    #[test]
    fn test_identity_preset() {
        let k = by_name("identity").unwrap();
        assert_eq!(k.size(), 3);
        assert_eq!(k.weight(1, 1), 1.0);
    }

    #[test]
    fn test_emboss_bias() {
        let k = by_name("emboss").unwrap();
        assert_eq!(k.bias(), 128.0);
        assert_eq!(k.factor(), 1.0);
    }

    #[test]
    fn test_composed_preset() {
        let k = by_name("blur+gaussian-blur").unwrap();
        assert_eq!(k.size(), 9); // 5 + 5 - 1
        assert!((k.factor() - 1.0 / 13.0 / 256.0).abs() < 1e-12);
    }

    #[test]
    fn test_composed_mismatched_sizes() {
        let k = by_name("fast-blur+motion-blur").unwrap();
        assert_eq!(k.size(), 11); // 3 + 9 - 1
    }

    #[test]
    fn test_unknown_preset() {
        assert!(matches!(
            by_name("sepia"),
            Err(KernelError::UnknownPreset(_))
        ));
        assert!(matches!(
            by_name("blur+sepia"),
            Err(KernelError::UnknownPreset(_))
        ));
    }
}
