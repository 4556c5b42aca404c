//! Connectivity tracking between trajectories.
//!
//! Global constraint searches discover links between trajectories as loop
//! closures land; this structure records them and answers which trajectories
//! form one connected component. It synchronizes internally because search
//! tasks record links concurrently with reads from the graph store.

use std::collections::HashMap;

use parking_lot::Mutex;

#[derive(Debug, Default)]
struct Forest {
    parent: HashMap<usize, usize>,
}

impl Forest {
    fn add(&mut self, trajectory_id: usize) {
        self.parent.entry(trajectory_id).or_insert(trajectory_id);
    }

    /// Root of the set containing `trajectory_id`, with path compression.
    fn find(&mut self, trajectory_id: usize) -> usize {
        assert!(
            self.parent.contains_key(&trajectory_id),
            "trajectory {trajectory_id} was never added to the connectivity forest"
        );
        let mut root = trajectory_id;
        while self.parent[&root] != root {
            root = self.parent[&root];
        }
        let mut current = trajectory_id;
        while current != root {
            let next = self.parent[&current];
            self.parent.insert(current, root);
            current = next;
        }
        root
    }

    fn union(&mut self, a: usize, b: usize) {
        let root_a = self.find(a);
        let root_b = self.find(b);
        if root_a != root_b {
            self.parent.insert(root_b, root_a);
        }
    }
}

/// Union-find over trajectory ids, shared between the graph store and the
/// constraint builder.
#[derive(Debug, Default)]
pub struct TrajectoryConnectivity {
    forest: Mutex<Forest>,
}

impl TrajectoryConnectivity {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a trajectory as its own singleton component. Idempotent.
    pub fn add(&self, trajectory_id: usize) {
        self.forest.lock().add(trajectory_id);
    }

    /// Records a direct link between two trajectories, adding either one
    /// if it was not yet known.
    pub fn connect(&self, trajectory_id_a: usize, trajectory_id_b: usize) {
        let mut forest = self.forest.lock();
        forest.add(trajectory_id_a);
        forest.add(trajectory_id_b);
        forest.union(trajectory_id_a, trajectory_id_b);
    }

    /// Whether a chain of recorded links joins the two trajectories.
    /// Unknown trajectories are connected only to themselves.
    pub fn transitively_connected(&self, trajectory_id_a: usize, trajectory_id_b: usize) -> bool {
        if trajectory_id_a == trajectory_id_b {
            return true;
        }
        let mut forest = self.forest.lock();
        if !forest.parent.contains_key(&trajectory_id_a)
            || !forest.parent.contains_key(&trajectory_id_b)
        {
            return false;
        }
        forest.find(trajectory_id_a) == forest.find(trajectory_id_b)
    }

    /// All components, each sorted ascending, ordered by smallest member.
    /// The deterministic order keeps snapshots comparable across calls.
    pub fn connected_components(&self) -> Vec<Vec<usize>> {
        let mut forest = self.forest.lock();
        let trajectory_ids: Vec<usize> = forest.parent.keys().copied().collect();
        let mut members: HashMap<usize, Vec<usize>> = HashMap::new();
        for trajectory_id in trajectory_ids {
            let root = forest.find(trajectory_id);
            members.entry(root).or_default().push(trajectory_id);
        }
        let mut components: Vec<Vec<usize>> = members.into_values().collect();
        for component in &mut components {
            component.sort_unstable();
        }
        components.sort_unstable_by_key(|component| component[0]);
        components
    }
}
