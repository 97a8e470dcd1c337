use rigger_converge::{Change, ConvergeReport, StatusLine};
use rigger_validate::ValidationReport;

fn marker(change: &Change) -> char {
    if change.is_create() {
        return '+';
    }
    match change {
        Change::InstancesTerminated { .. }
        | Change::DatabaseDeleted { .. }
        | Change::LoadBalancerDeleted { .. }
        | Change::AddressDisassociated { .. }
        | Change::VolumeDetached { .. } => '-',
        _ => '~',
    }
}

/// Render a controller report as human-readable text. Errors are left to
/// [`render_errors`].
pub fn render_report(report: &ConvergeReport) -> String {
    let mut out = String::new();
    for change in &report.changes {
        out.push_str(&format!("{} {}\n", marker(change), change));
    }
    for node in &report.already_running {
        out.push_str(&format!("= {} already running\n", node));
    }
    out.push_str(&format!(
        "{} {}: {} change(s), {} created.",
        report.operation,
        report.cloud,
        report.changes.len(),
        report.creates()
    ));
    out
}

pub fn render_errors(errors: &[String]) -> String {
    let mut out = format!("{} error(s):", errors.len());
    for e in errors {
        out.push_str(&format!("\n  ! {}", e));
    }
    out
}

pub fn render_status(lines: &[StatusLine]) -> String {
    if lines.is_empty() {
        return "No nodes.".to_string();
    }
    lines.iter().map(ToString::to_string).collect::<Vec<_>>().join("\n")
}

pub fn render_validation(cloud: &str, report: &ValidationReport) -> String {
    if report.is_valid() {
        return format!("{}: ok", cloud);
    }
    let mut out = format!("{}: {} problem(s)", cloud, report.errors.len());
    for message in report.messages() {
        out.push_str(&format!("\n  ! {}", message));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn report_marks_creates_and_deletes() {
        let mut report = ConvergeReport::new("prod", "start");
        report.record(Change::SecurityGroupCreated { group: "prod.role.web".into() });
        report.record(Change::IngressAuthorized {
            group: "prod.role.web".into(),
            rule:  "tcp 80 from 0.0.0.0/0".into(),
        });
        report.record(Change::InstancesTerminated { nodes: vec!["web-2".into()] });
        report.already_running("web-1");

        let text = render_report(&report);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "+ created security group prod.role.web");
        assert!(lines[1].starts_with("~ authorized"));
        assert_eq!(lines[2], "- terminated web-2");
        assert_eq!(lines[3], "= web-1 already running");
        assert_eq!(lines[4], "start prod: 3 change(s), 1 created.");
    }

    #[test]
    fn empty_status() {
        assert_eq!(render_status(&[]), "No nodes.");
    }

    #[test]
    fn status_lines_are_joined() {
        let lines = vec![
            StatusLine {
                node:    "db".into(),
                kind:    "rds".into(),
                state:   "available".into(),
                address: Some("db.example".into()),
                members: Vec::new(),
            },
            StatusLine {
                node:    "front".into(),
                kind:    "elb".into(),
                state:   "running".into(),
                address: None,
                members: vec![("i-1".into(), "InService".into())],
            },
        ];
        assert_eq!(
            render_status(&lines),
            "db (rds): available db.example\nfront (elb): running\n    i-1 InService"
        );
    }

    #[test]
    fn errors_are_listed() {
        let text = render_errors(&["web-1: boom".to_string()]);
        assert_eq!(text, "1 error(s):\n  ! web-1: boom");
    }
}
