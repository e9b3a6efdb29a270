//! The fixed, ordered list of production processes.

use super::models::{PROCESS_COUNT, Process};

/// Process names in sequence order. `proc-N` is the N-th entry.
pub const PROCESS_NAMES: [&str; PROCESS_COUNT] = [
    "Cutting",
    "Drilling",
    "PTH",
    "Dry Film",
    "Pattern Plating",
    "Etching",
    "Pre-Mask Q.C.",
    "Solder Mask",
    "Legend Printing",
    "Surface Finish",
    "Routing",
    "V-Cut",
    "BBT",
    "Q.C",
    "Assembly",
    "PACKING",
    "Dispatch",
];

/// Processes that record an IN/OUT quantity pair instead of a single
/// launched quantity.
pub const QC_PROCESSES: [&str; 4] = ["Pre-Mask Q.C.", "BBT", "Q.C", "PACKING"];

pub fn is_qc_process(process_name: &str) -> bool {
    QC_PROCESSES.contains(&process_name)
}

/// The standard process rows seeded into every store.
pub fn standard_processes() -> Vec<Process> {
    PROCESS_NAMES
        .iter()
        .enumerate()
        .map(|(i, name)| Process {
            process_id: format!("proc-{}", i + 1),
            process_name: name.to_string(),
            sequence_number: (i + 1) as u32,
        })
        .collect()
}

/// Processes ordered by sequence number.
#[derive(Debug, Clone)]
pub struct ProcessCatalog {
    processes: Vec<Process>,
}

impl ProcessCatalog {
    pub fn new(mut processes: Vec<Process>) -> Self {
        processes.sort_by_key(|p| p.sequence_number);
        Self { processes }
    }

    pub fn standard() -> Self {
        Self::new(standard_processes())
    }

    pub fn len(&self) -> usize {
        self.processes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.processes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Process> {
        self.processes.iter()
    }

    pub fn first(&self) -> Option<&Process> {
        self.processes.first()
    }

    pub fn get(&self, process_id: &str) -> Option<&Process> {
        self.processes.iter().find(|p| p.process_id == process_id)
    }

    /// Position of a process in sequence order.
    pub fn position(&self, process_id: &str) -> Option<usize> {
        self.processes.iter().position(|p| p.process_id == process_id)
    }

    /// The process that follows `process_id`, if any.
    pub fn next_after(&self, process_id: &str) -> Option<&Process> {
        self.position(process_id)
            .and_then(|i| self.processes.get(i + 1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_standard_catalog_has_seventeen_unique_steps() {
        let catalog = ProcessCatalog::standard();
        assert_eq!(catalog.len(), PROCESS_COUNT);

        let ids: HashSet<_> = catalog.iter().map(|p| p.process_id.clone()).collect();
        let seqs: HashSet<_> = catalog.iter().map(|p| p.sequence_number).collect();
        assert_eq!(ids.len(), PROCESS_COUNT);
        assert_eq!(seqs, (1..=17).collect::<HashSet<u32>>());
        assert_eq!(catalog.first().unwrap().process_name, "Cutting");
    }

    #[test]
    fn test_catalog_sorts_by_sequence() {
        let mut processes = standard_processes();
        processes.reverse();
        let catalog = ProcessCatalog::new(processes);
        assert_eq!(catalog.first().unwrap().process_id, "proc-1");
        assert_eq!(catalog.next_after("proc-1").unwrap().process_id, "proc-2");
        assert!(catalog.next_after("proc-17").is_none());
        assert!(catalog.next_after("proc-99").is_none());
    }

    #[test]
    fn test_qc_processes_are_in_catalog() {
        let catalog = ProcessCatalog::standard();
        for name in QC_PROCESSES {
            assert!(catalog.iter().any(|p| p.process_name == name), "{name}");
        }
        assert!(is_qc_process("BBT"));
        assert!(!is_qc_process("Drilling"));
    }
}
