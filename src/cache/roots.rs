use std::path::{Component, Path, PathBuf};

/// Directories that belong both to a client workspace and to the project.
///
/// Paths are compared as lists of components, so `/p/src` is never taken
/// as an ancestor of `/p/src2`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientRoots {
    roots: Vec<PathBuf>,
}

impl ClientRoots {
    /// Minimal set of directories inside both a workspace root and a project
    /// source directory.
    pub fn compute(client_roots: &[PathBuf], project_dirs: &[PathBuf]) -> Self {
        let mut candidates: Vec<PathBuf> = Vec::new();
        for workspace in client_roots {
            let workspace_segments = segments(workspace);
            for project in project_dirs {
                let project_segments = segments(project);
                let inner = if starts_with(&project_segments, &workspace_segments) {
                    project
                } else if starts_with(&workspace_segments, &project_segments) {
                    workspace
                } else {
                    continue;
                };
                if !candidates.contains(inner) {
                    candidates.push(inner.clone());
                }
            }
        }

        let roots = candidates
            .iter()
            .filter(|candidate| {
                let candidate_segments = segments(candidate);
                !candidates.iter().any(|other| {
                    let other_segments = segments(other);
                    other_segments.len() < candidate_segments.len()
                        && starts_with(&candidate_segments, &other_segments)
                })
            })
            .cloned()
            .collect();
        ClientRoots { roots }
    }

    pub fn roots(&self) -> &[PathBuf] {
        &self.roots
    }

    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }

    /// Segment count of the shallowest root containing `file`, or `None`
    /// when no root does.
    pub fn match_depth(&self, file: &Path) -> Option<usize> {
        let file_segments = segments(file);
        self.roots
            .iter()
            .map(|root| segments(root))
            .filter(|root| starts_with(&file_segments, root))
            .map(|root| root.len())
            .min()
    }

    pub fn contains(&self, file: &Path) -> bool {
        self.match_depth(file).is_some()
    }
}

fn segments(path: &Path) -> Vec<Component<'_>> {
    path.components()
        .filter(|c| !matches!(c, Component::CurDir))
        .collect()
}

fn starts_with(path: &[Component<'_>], prefix: &[Component<'_>]) -> bool {
    path.len() >= prefix.len() && path[..prefix.len()] == *prefix
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn paths(list: &[&str]) -> Vec<PathBuf> {
        list.iter().map(PathBuf::from).collect()
    }

    #[rstest]
    #[case::workspace_above_project(&["/w"], &["/w/proj"], &["/w/proj"])]
    #[case::workspace_below_project(&["/w/proj/src"], &["/w/proj"], &["/w/proj/src"])]
    #[case::disjoint(&["/w/a"], &["/w/b"], &[])]
    #[case::shared_name_prefix(&["/w/src"], &["/w/src2"], &[])]
    #[case::nested_results_collapse(&["/w", "/w/proj/lib"], &["/w/proj"], &["/w/proj"])]
    fn test_compute_roots(
        #[case] client: &[&str],
        #[case] project: &[&str],
        #[case] expected: &[&str],
    ) {
        let roots = ClientRoots::compute(&paths(client), &paths(project));
        assert_eq!(roots.roots(), paths(expected).as_slice());
    }

    #[rstest]
    #[case::inside("/w/proj/src/main.rs", Some(3))]
    #[case::root_itself("/w/proj", Some(3))]
    #[case::sibling_with_shared_prefix("/w/project/main.rs", None)]
    #[case::outside("/other/main.rs", None)]
    fn test_match_depth(#[case] file: &str, #[case] expected: Option<usize>) {
        let roots = ClientRoots::compute(&paths(&["/w"]), &paths(&["/w/proj"]));
        assert_eq!(roots.match_depth(Path::new(file)), expected);
    }
}
