// src/gcode/mod.rs - Fallback interpreter for plain motion-code work items
use crate::robot::{MoveTarget, RobotController};
use crate::work::WorkItem;

/// Interpret a motion-code line against the robot controller.
///
/// Returns true when the line was consumed (including rejected moves, which
/// are reported and dropped). Unknown words return false so the dispatcher
/// can log the item as unhandled.
pub fn interpret_motion_code(item: &WorkItem, robot: &mut RobotController) -> bool {
    let line = item.command().trim();
    if line.is_empty() {
        return false;
    }
    let mut words = line.split_whitespace();
    let Some(code) = words.next() else {
        return false;
    };

    match code.to_ascii_uppercase().as_str() {
        "G0" | "G1" => {
            let mut x = None;
            let mut y = None;
            for word in words {
                let Some(letter) = word.chars().next() else {
                    continue;
                };
                if !letter.is_ascii_alphabetic() {
                    continue;
                }
                match (letter.to_ascii_uppercase(), word[1..].parse::<f64>()) {
                    ('X', Ok(value)) => x = Some(value),
                    ('Y', Ok(value)) => y = Some(value),
                    // Feedrate is the lower motion layer's concern.
                    ('F', Ok(_)) => {}
                    _ => tracing::debug!("Ignoring word '{}' in '{}'", word, line),
                }
            }
            let current = robot.position().axis_position_mm;
            let target = MoveTarget::new(
                x.unwrap_or_else(|| current.val(0)),
                y.unwrap_or_else(|| current.val(1)),
            );
            if let Err(err) = robot.move_to(target) {
                tracing::warn!("Rejected move '{}': {}", line, err);
            }
            true
        }
        "G28" => {
            robot.home();
            true
        }
        code if code.starts_with('M') => {
            tracing::debug!("Ignoring M-code '{}'", line);
            true
        }
        _ => {
            tracing::warn!("Unrecognized motion code: {}", line);
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RobotConfig;

    fn test_robot() -> RobotController {
        let mut config = RobotConfig::default();
        config.axes.linear.max_travel_mm = 100.0;
        RobotController::new(&config)
    }

    #[test]
    fn test_linear_move() {
        let mut robot = test_robot();
        assert!(interpret_motion_code(
            &WorkItem::new("G0 X50.000 Y0.000 F1500"),
            &mut robot
        ));
        robot.service();
        assert!((robot.status().x_mm - 50.0).abs() < 0.5);
    }

    #[test]
    fn test_missing_coordinate_keeps_current() {
        let mut robot = test_robot();
        interpret_motion_code(&WorkItem::new("G0 X30 Y40"), &mut robot);
        robot.service();
        interpret_motion_code(&WorkItem::new("G1 X30"), &mut robot);
        robot.service();
        let status = robot.status();
        assert!((status.x_mm - 30.0).abs() < 0.5);
        assert!((status.y_mm - 40.0).abs() < 0.5);
    }

    #[test]
    fn test_out_of_bounds_move_is_consumed_but_dropped() {
        let mut robot = test_robot();
        assert!(interpret_motion_code(
            &WorkItem::new("G0 X500 Y0"),
            &mut robot
        ));
        robot.service();
        assert!(robot.status().x_mm.abs() < 1e-9);
    }

    #[test]
    fn test_home() {
        let mut robot = test_robot();
        interpret_motion_code(&WorkItem::new("G0 X30 Y40"), &mut robot);
        robot.service();
        assert!(interpret_motion_code(&WorkItem::new("G28"), &mut robot));
        let status = robot.status();
        assert_eq!(status.steps_from_home, [0, 0]);
        assert!(status.x_mm.abs() < 1e-9);
    }

    #[test]
    fn test_m_codes_ignored_and_unknown_rejected() {
        let mut robot = test_robot();
        assert!(interpret_motion_code(&WorkItem::new("M106 S255"), &mut robot));
        assert!(!interpret_motion_code(&WorkItem::new("hello"), &mut robot));
        assert!(!interpret_motion_code(&WorkItem::new(""), &mut robot));
    }
}
