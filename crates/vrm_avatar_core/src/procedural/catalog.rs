use indexmap::IndexMap;

use super::{EulerDelta, ExpressionTrigger, MovementDescriptor, MovementStage, YawRange};
use crate::humanoid::HumanoidBone::{self, *};

fn rotations(deltas: &[(HumanoidBone, f32, f32, f32)]) -> IndexMap<HumanoidBone, EulerDelta> {
    deltas
        .iter()
        .map(|(bone, x, y, z)| (*bone, EulerDelta::new(*x, *y, *z)))
        .collect()
}

fn expression(chance: f32, candidates: &[&str]) -> Option<ExpressionTrigger> {
    Some(ExpressionTrigger {
        chance,
        candidates: candidates.iter().map(|c| c.to_string()).collect(),
    })
}

fn yaw(min: f32, max: f32) -> Option<YawRange> {
    Some(YawRange { min, max })
}

fn movement(
    description: &str,
    duration_ms: f32,
    deltas: &[(HumanoidBone, f32, f32, f32)],
) -> MovementDescriptor {
    MovementDescriptor {
        description: description.to_string(),
        duration_ms,
        rotations: rotations(deltas),
        stages: Vec::new(),
        model_rotation: None,
        expression: None,
    }
}

/// The built-in idle gestures, in a stable order
pub fn builtin_movements() -> IndexMap<String, MovementDescriptor> {
    let mut movements = IndexMap::new();

    movements.insert(
        "slowHeadTurn".into(),
        MovementDescriptor {
            model_rotation: yaw(0.08, 0.18),
            ..movement(
                "slow head turn",
                12000.,
                &[(Head, 0.08, 0.35, 0.05), (Neck, 0.04, 0.15, 0.03)],
            )
        },
    );

    movements.insert(
        "headTilt".into(),
        MovementDescriptor {
            expression: expression(0.5, &["happy", "blinkLeft", "blinkRight"]),
            ..movement(
                "curious head tilt",
                12000.,
                &[(Head, 0.06, 0.08, 0.35), (Neck, 0.03, 0.05, 0.2)],
            )
        },
    );

    movements.insert(
        "slowGlance".into(),
        MovementDescriptor {
            expression: expression(0.5, &["surprised"]),
            model_rotation: yaw(0.05, 0.12),
            ..movement(
                "casual glance",
                10000.,
                &[
                    (Head, 0.12, 0.28, 0.08),
                    (Neck, 0.06, 0.15, 0.04),
                    (Spine, 0.03, 0.12, 0.05),
                ],
            )
        },
    );

    movements.insert(
        "lookAround".into(),
        MovementDescriptor {
            stages: [
                (0.12, 0.32, 0.04, 3500.),
                (0.05, 0.08, 0.02, 2500.),
                (0.1, -0.28, -0.03, 3500.),
                (0.02, -0.06, 0.01, 3000.),
            ]
            .into_iter()
            .map(|(x, y, z, duration_ms)| MovementStage {
                duration_ms,
                rotations: rotations(&[(Head, x, y, z)]),
            })
            .collect(),
            expression: expression(0.6, &["happy"]),
            model_rotation: yaw(0.06, 0.12),
            ..movement("looking around", 16000., &[(Head, 0.1, 0.25, 0.05)])
        },
    );

    movements.insert(
        "weightShift".into(),
        MovementDescriptor {
            expression: expression(0.4, &["neutral"]),
            model_rotation: yaw(0.08, 0.18),
            ..movement(
                "weight shift with spine twist",
                10000.,
                &[
                    (Spine, 0.08, 0.22, 0.15),
                    (Hips, 0.06, -0.12, 0.12),
                    (UpperChest, 0.04, 0.1, 0.08),
                ],
            )
        },
    );

    movements.insert(
        "neckStretch".into(),
        MovementDescriptor {
            expression: expression(0.5, &["surprised"]),
            ..movement(
                "neck stretch",
                10000.,
                &[(Neck, 0.12, 0.25, 0.35), (Head, 0.08, 0.15, 0.28)],
            )
        },
    );

    movements.insert(
        "subtleNod".into(),
        MovementDescriptor {
            expression: expression(0.7, &["happy"]),
            ..movement(
                "subtle nod",
                8000.,
                &[(Head, 0.22, 0.05, 0.03), (Neck, 0.12, 0.03, 0.02)],
            )
        },
    );

    movements.insert(
        "hipShift".into(),
        MovementDescriptor {
            expression: expression(0.4, &["surprised"]),
            model_rotation: yaw(0.08, 0.16),
            ..movement(
                "hip shift with rotation",
                11000.,
                &[
                    (Hips, 0.1, 0.25, 0.22),
                    (Spine, 0.08, -0.15, -0.12),
                    (UpperChest, 0.05, 0.08, 0.06),
                ],
            )
        },
    );

    movements.insert(
        "torsoSway".into(),
        MovementDescriptor {
            expression: expression(0.5, &["surprised", "relaxed"]),
            model_rotation: yaw(0.08, 0.18),
            ..movement(
                "torso sway with twist",
                12000.,
                &[
                    (Spine, 0.1, 0.28, 0.12),
                    (UpperChest, 0.08, 0.18, 0.1),
                    (Hips, 0.05, -0.1, 0.08),
                ],
            )
        },
    );

    movements.insert(
        "feminineHipSway".into(),
        MovementDescriptor {
            expression: expression(0.7, &["happy"]),
            model_rotation: yaw(0.06, 0.14),
            ..movement(
                "feminine hip sway",
                14000.,
                &[
                    (Hips, 0.08, 0.15, 0.35),
                    (Spine, 0.06, -0.1, -0.18),
                    (UpperChest, 0.08, -0.12, -0.12),
                    (Neck, 0.04, -0.08, 0.1),
                ],
            )
        },
    );

    movements.insert(
        "coyHeadTilt".into(),
        MovementDescriptor {
            expression: expression(0.7, &["relaxed", "shy"]),
            ..movement(
                "coy head tilt",
                11000.,
                &[(Head, 0.15, 0.12, -0.38), (Neck, 0.08, 0.06, -0.22)],
            )
        },
    );

    movements.insert(
        "chestLift".into(),
        MovementDescriptor {
            expression: expression(0.6, &["happy", "relaxed"]),
            ..movement(
                "chest lift",
                9000.,
                &[
                    (UpperChest, 0.22, 0.08, 0.05),
                    (Spine, 0.12, 0.06, 0.04),
                    (Neck, -0.08, 0.04, 0.03),
                ],
            )
        },
    );

    movements
}
