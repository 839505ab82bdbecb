use bevy::log::debug;
use rand::{Rng, seq::IndexedRandom};

use crate::mixer::ActionId;

/// Motion name that means "no motion"
pub const NO_MOTION: &str = "none";

/// Group name of a motion file: the extension and any trailing digits are stripped, so
/// `Idle.bvh`, `Idle1.bvh` and `Idle2.bvh` all belong to `Idle`.
pub fn motion_base_name(file: &str) -> &str {
    let stem = match file.rfind('.') {
        Some(dot) if dot + 1 < file.len() && !file[dot + 1..].contains('/') => &file[..dot],
        _ => file,
    };
    stem.trim_end_matches(|c: char| c.is_ascii_digit())
}

fn file_name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

/// The motion files available to the host
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MotionCatalog {
    files: Vec<String>,
}

impl MotionCatalog {
    pub fn new<S: Into<String>>(files: impl IntoIterator<Item = S>) -> Self {
        Self {
            files: files.into_iter().map(Into::into).collect(),
        }
    }

    pub fn files(&self) -> &[String] {
        &self.files
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn contains(&self, file: &str) -> bool {
        self.files.iter().any(|f| f == file)
    }

    /// Every file sharing the base name of `file`
    pub fn group(&self, file: &str) -> Vec<&str> {
        let base = motion_base_name(file);
        self.files
            .iter()
            .map(String::as_str)
            .filter(|candidate| motion_base_name(candidate) == base)
            .collect()
    }

    /// Uniform pick among the group of `file`
    pub fn pick_random(&self, file: &str, rng: &mut impl Rng) -> Option<&str> {
        let group = self.group(file);
        let picked = group.choose(rng).copied();
        debug!("Picked {picked:?} among {group:?}");
        picked
    }

    /// Resolves a loose motion reference, as typed in sequences and commands.
    ///
    /// References containing a `.` are taken as file paths. Otherwise files are matched by
    /// name, case-insensitively: same base name first, then name prefix, then substring.
    pub fn resolve(&self, reference: &str) -> Option<String> {
        let reference = reference.trim();
        if reference.is_empty() {
            return None;
        }
        if reference.contains('.') {
            return Some(reference.to_string());
        }

        let needle = reference.to_lowercase();
        let names: Vec<(&String, String)> = self
            .files
            .iter()
            .map(|file| (file, file_name(file).to_lowercase()))
            .collect();

        let by = |matches: &dyn Fn(&str) -> bool| {
            names
                .iter()
                .find(|(_, name)| matches(name))
                .map(|(file, _)| file.to_string())
        };

        by(&|name: &str| motion_base_name(name) == needle)
            .or_else(|| by(&|name: &str| name.starts_with(needle.as_str())))
            .or_else(|| by(&|name: &str| name.contains(needle.as_str())))
    }
}

/// What an avatar is currently playing
#[derive(Clone, Debug, PartialEq)]
pub struct CurrentMotion {
    pub name: String,
    pub action: Option<ActionId>,
    pub looping: bool,
}

impl Default for CurrentMotion {
    fn default() -> Self {
        Self {
            name: NO_MOTION.into(),
            action: None,
            looping: false,
        }
    }
}

#[cfg(test)]
mod test {
    use rand::{SeedableRng, rngs::StdRng};

    use super::*;

    #[test]
    fn base_names() {
        assert_eq!(motion_base_name("Idle.bvh"), "Idle");
        assert_eq!(motion_base_name("Idle12.bvh"), "Idle");
        assert_eq!(motion_base_name("anims/Wave2.fbx"), "anims/Wave");
        assert_eq!(motion_base_name("none"), "none");
        assert_eq!(motion_base_name("v1.2/dance"), "v1.2/dance");
    }

    #[test]
    fn random_group_is_roughly_uniform() {
        let catalog = MotionCatalog::new(["Idle.bvh", "Idle1.bvh", "Idle2.bvh", "Wave.fbx"]);
        let mut rng = StdRng::seed_from_u64(7);

        let mut counts = [0usize; 3];
        for _ in 0..10_000 {
            match catalog.pick_random("Idle.bvh", &mut rng) {
                Some("Idle.bvh") => counts[0] += 1,
                Some("Idle1.bvh") => counts[1] += 1,
                Some("Idle2.bvh") => counts[2] += 1,
                other => panic!("unexpected pick {other:?}"),
            }
        }

        for count in counts {
            assert!((3000..3700).contains(&count), "{counts:?}");
        }
    }

    #[test]
    fn resolves_loose_references() {
        let catalog = MotionCatalog::new(["anims/Wave.fbx", "anims/Pointing.bvh", "anims/HappyIdle.vrma"]);

        assert_eq!(catalog.resolve("wave").as_deref(), Some("anims/Wave.fbx"));
        assert_eq!(catalog.resolve("point").as_deref(), Some("anims/Pointing.bvh"));
        assert_eq!(catalog.resolve("idle").as_deref(), Some("anims/HappyIdle.vrma"));
        assert_eq!(catalog.resolve("Other.vmd").as_deref(), Some("Other.vmd"));
        assert_eq!(catalog.resolve("jump"), None);
    }
}
