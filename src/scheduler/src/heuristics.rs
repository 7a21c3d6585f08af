use common::ScheduledModule;

/// Candidate placement: the module and where it goes in the run's module list.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Placement {
    pub insert_at: usize,
    pub module: ScheduledModule,
}

impl Placement {
    fn length(&self) -> usize {
        self.module.end() - self.module.start() + 1
    }
}

/// Strategy for cutting down the candidate placements of a node.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ModuleSelection {
    ShortestAvailable,
    LongestAvailable,
    FirstAvailable,
    LastAvailable,
    AllAvailable,
}

impl ModuleSelection {
    /// Keeps the candidates matching the strategy, in their incoming order.
    pub fn select(self, placements: Vec<Placement>) -> Vec<Placement> {
        let key: fn(&Placement) -> usize = match self {
            ModuleSelection::AllAvailable => return placements,
            ModuleSelection::ShortestAvailable | ModuleSelection::LongestAvailable => {
                Placement::length
            }
            ModuleSelection::FirstAvailable | ModuleSelection::LastAvailable => {
                |placement: &Placement| placement.module.start()
            }
        };
        let target = match self {
            ModuleSelection::ShortestAvailable | ModuleSelection::FirstAvailable => {
                placements.iter().map(key).min()
            }
            _ => placements.iter().map(key).max(),
        };
        match target {
            Some(target) => placements
                .into_iter()
                .filter(|placement| key(placement) == target)
                .collect(),
            None => placements,
        }
    }
}

/// Selections applied in a row are ANDed, the clauses are ORed.
pub type SelectionClauses = Vec<Vec<ModuleSelection>>;

/// Clauses for the library wide start locations and for the satisfying bitstreams.
#[derive(Clone, Debug, PartialEq)]
pub struct HeuristicChoice {
    pub fitting: SelectionClauses,
    pub satisfying: SelectionClauses,
}

/// Heuristic table indexed by the configured heuristic choice.
pub fn default_heuristics() -> Vec<HeuristicChoice> {
    use ModuleSelection::*;
    vec![
        HeuristicChoice {
            fitting: vec![vec![ShortestAvailable, FirstAvailable]],
            satisfying: vec![vec![LongestAvailable, FirstAvailable]],
        },
        HeuristicChoice {
            fitting: vec![vec![ShortestAvailable]],
            satisfying: vec![vec![LongestAvailable]],
        },
        HeuristicChoice {
            fitting: vec![vec![ShortestAvailable]],
            satisfying: vec![vec![LongestAvailable]],
        },
        HeuristicChoice {
            fitting: vec![vec![AllAvailable]],
            satisfying: vec![vec![AllAvailable]],
        },
        HeuristicChoice {
            fitting: vec![],
            satisfying: vec![vec![AllAvailable]],
        },
    ]
}

/// Applies the clauses and merges their results without duplicates.
///
/// # Arguments
///
/// * `placements` - All candidate placements of a node.
/// * `clauses` - Selection clauses.
pub fn select_according_to_preferences(
    placements: &[Placement],
    clauses: &[Vec<ModuleSelection>],
) -> Vec<Placement> {
    let mut chosen: Vec<Placement> = Vec::new();
    for clause in clauses {
        let mut selected = placements.to_vec();
        for selection in clause {
            selected = selection.select(selected);
        }
        for placement in selected {
            if !chosen.contains(&placement) {
                chosen.push(placement);
            }
        }
    }
    chosen
}

#[cfg(test)]
mod test {
    use super::*;
    use common::OperationType;

    fn placement(insert_at: usize, bitstream: &str, position: (usize, usize)) -> Placement {
        Placement {
            insert_at,
            module: ScheduledModule::new("n", OperationType::Filter, bitstream, position),
        }
    }

    fn candidates() -> Vec<Placement> {
        vec![
            placement(0, "small", (0, 0)),
            placement(0, "large", (0, 1)),
            placement(1, "small", (2, 2)),
            placement(1, "large", (2, 3)),
        ]
    }

    #[test]
    fn test_single_selections() {
        let all = candidates();
        assert_eq!(ModuleSelection::AllAvailable.select(all.clone()), all);
        assert_eq!(
            ModuleSelection::ShortestAvailable.select(all.clone()),
            vec![all[0].clone(), all[2].clone()]
        );
        assert_eq!(
            ModuleSelection::LongestAvailable.select(all.clone()),
            vec![all[1].clone(), all[3].clone()]
        );
        assert_eq!(
            ModuleSelection::FirstAvailable.select(all.clone()),
            vec![all[0].clone(), all[1].clone()]
        );
        assert_eq!(
            ModuleSelection::LastAvailable.select(all.clone()),
            vec![all[2].clone(), all[3].clone()]
        );
        assert!(ModuleSelection::FirstAvailable.select(vec![]).is_empty());
    }

    #[test]
    fn test_clauses() {
        let all = candidates();
        let and = select_according_to_preferences(
            &all,
            &[vec![ModuleSelection::ShortestAvailable, ModuleSelection::FirstAvailable]],
        );
        assert_eq!(and, vec![all[0].clone()]);
        let or = select_according_to_preferences(
            &all,
            &[
                vec![ModuleSelection::ShortestAvailable],
                vec![ModuleSelection::FirstAvailable],
            ],
        );
        assert_eq!(or, vec![all[0].clone(), all[2].clone(), all[1].clone()]);
        assert!(select_according_to_preferences(&all, &[]).is_empty());
    }

    #[test]
    fn test_default_table() {
        let table = default_heuristics();
        assert_eq!(table.len(), 5);
        assert!(table[4].fitting.is_empty());
        assert_eq!(table[3].satisfying, vec![vec![ModuleSelection::AllAvailable]]);
    }
}
