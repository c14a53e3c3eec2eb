pub mod catalog;
pub mod graph;
pub mod list;
pub mod plan;
pub mod run;

/// `None` when no targets were given, so the command covers every service
pub fn target_filter(targets: &[String]) -> Option<&[String]> {
    if targets.is_empty() {
        None
    } else {
        Some(targets)
    }
}
