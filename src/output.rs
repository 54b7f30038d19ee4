//! Terminal rendering for discovered instances.

use serde::Serialize;

use pbilink_core::discovery::InstanceDescriptor;

use crate::monitor::InstanceChange;

/// JSON shape of one instance; unknown pids render as -1
#[derive(Debug, Serialize)]
pub struct InstanceRow<'a> {
    pub process_id: i64,
    pub port: u16,
    pub source_file_path: &'a str,
    pub display_name: &'a str,
}

impl<'a> From<&'a InstanceDescriptor> for InstanceRow<'a> {
    fn from(instance: &'a InstanceDescriptor) -> Self {
        Self {
            process_id: instance.process_id().map_or(-1, i64::from),
            port: instance.port(),
            source_file_path: instance.source_file_path(),
            display_name: instance.display_name(),
        }
    }
}

/// Render instances as pretty JSON
pub fn instances_json(instances: &[InstanceDescriptor]) -> serde_json::Result<String> {
    let rows: Vec<InstanceRow<'_>> = instances.iter().map(InstanceRow::from).collect();
    serde_json::to_string_pretty(&rows)
}

/// Render instances as an aligned table
pub fn instances_table(instances: &[InstanceDescriptor]) -> String {
    if instances.is_empty() {
        return "No instances found".to_string();
    }

    let pids: Vec<String> = instances
        .iter()
        .map(|i| i.process_id().map_or_else(|| "-".to_string(), |p| p.to_string()))
        .collect();
    let pid_width = pids.iter().map(String::len).max().unwrap_or(0).max(3);

    let mut out = format!("{:>pid_width$}  {:>5}  SOURCE\n", "PID", "PORT");
    for (instance, pid) in instances.iter().zip(&pids) {
        out.push_str(&format!(
            "{:>pid_width$}  {:>5}  {}\n",
            pid,
            instance.port(),
            instance.source_file_path()
        ));
    }
    out.truncate(out.trim_end().len());
    out
}

/// One line per watch change
pub fn change_line(change: &InstanceChange) -> String {
    match change {
        InstanceChange::Appeared(instance) => format!("+ {}", instance),
        InstanceChange::Disappeared(instance) => format!("- {}", instance),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn instances() -> Vec<InstanceDescriptor> {
        vec![
            InstanceDescriptor::new(Some(4120), 51234, "/reports/Sales.pbix"),
            InstanceDescriptor::new(None, 60001, "Unknown"),
        ]
    }

    #[test]
    fn test_table_layout() {
        let table = instances_table(&instances());
        assert_eq!(
            table,
            " PID   PORT  SOURCE\n\
             4120  51234  /reports/Sales.pbix\n   \
             -  60001  Unknown"
        );
    }

    #[test]
    fn test_table_empty() {
        assert_eq!(instances_table(&[]), "No instances found");
    }

    #[test]
    fn test_json_unknown_pid() {
        let json = instances_json(&instances()).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value[0]["process_id"], 4120);
        assert_eq!(value[0]["display_name"], "Sales.pbix");
        assert_eq!(value[1]["process_id"], -1);
        assert_eq!(value[1]["source_file_path"], "Unknown");
    }

    #[test]
    fn test_change_line() {
        let instance = InstanceDescriptor::new(Some(7), 50000, "/r/a.pbix");
        assert_eq!(
            change_line(&InstanceChange::Appeared(instance.clone())),
            "+ a.pbix (pid 7, port 50000)"
        );
        assert_eq!(
            change_line(&InstanceChange::Disappeared(instance)),
            "- a.pbix (pid 7, port 50000)"
        );
    }
}
