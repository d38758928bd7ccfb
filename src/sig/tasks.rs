//! Ordered task lists for the editing layer.
//!
//! The core never applies UI transactions itself: it computes *what* should
//! change as an ordered list of tasks, and an external transactional-apply
//! layer commits them atomically (or drops them all).

use serde::{Deserialize, Serialize};

use crate::model::{Inter, InterId, Link, RelId};
use crate::scale::{Profile, Scale};

use super::{ensemble, search, Sig};

/// One step of a pending edit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum UiTask {
    /// Add the subject inter to the graph.
    Addition,
    /// Connect the subject through this candidate link.
    Link { link: Link },
    /// Remove an existing edge.
    Unlink { edge: RelId },
    /// Remove an existing inter.
    Removal { inter: InterId },
}

/// Tasks to perform when adding `inter`: the addition itself, then every
/// link the current graph state justifies.
pub fn pre_add(sig: &Sig, inter: &Inter, scale: &Scale, profile: Profile) -> Vec<UiTask> {
    let mut tasks = vec![UiTask::Addition];

    for link in search::search_links(sig, inter, scale, profile) {
        tasks.push(UiTask::Link { link });
    }

    tasks
}

/// Tasks to perform when removing `inter`: the removal itself, then the
/// removal of any ensemble this would leave empty.
pub fn pre_remove(sig: &Sig, inter: InterId) -> Vec<UiTask> {
    let mut tasks = vec![UiTask::Removal { inter }];

    for ens in ensemble::containing_ensembles(sig, inter) {
        let remaining = ensemble::members(sig, ens)
            .iter()
            .filter(|m| **m != inter)
            .count();

        if remaining == 0 && !sig.inter(ens).manual {
            tasks.push(UiTask::Removal { inter: ens });
        }
    }

    tasks
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geom::LineSeg;
    use crate::model::Relation;

    #[test]
    fn test_pre_add_beam_links() {
        let mut sig = Sig::new();
        let scale = Scale::new(20.0);
        sig.add(Inter::new_stem(LineSeg::new(150.0, 20.0, 150.0, 52.0), 0.9));

        let beam = Inter::new_beam(LineSeg::new(100.0, 50.0, 200.0, 50.0), 5.0, 0.9);
        let tasks = pre_add(&sig, &beam, &scale, Profile::STRICT);

        assert_eq!(tasks[0], UiTask::Addition);
        assert!(matches!(tasks[1], UiTask::Link { .. }));
        assert_eq!(tasks.len(), 2);
    }

    #[test]
    fn test_pre_remove_reports_dying_ensemble() {
        let mut sig = Sig::new();
        let group = sig.add(Inter::new_beam_group());
        let beam = sig.add(Inter::new_beam(LineSeg::new(0.0, 10.0, 40.0, 10.0), 4.0, 0.8));
        sig.add_edge(group, beam, Relation::Containment).unwrap();

        let tasks = pre_remove(&sig, beam);
        assert_eq!(tasks.len(), 2);
        assert_eq!(tasks[1], UiTask::Removal { inter: group });
    }
}
