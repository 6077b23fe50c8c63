use std::collections::{HashMap, HashSet};

pub const JAVA_LANG_OBJECT: &str = "java/lang/Object";
pub const JAVA_LANG_THROWABLE: &str = "java/lang/Throwable";

/// Superclass relationships used when merging reference types
///
/// The frame inferencer needs a common superclass whenever two different classes flow into the
/// same stack slot or local. Anything the hierarchy does not know about is assumed to extend
/// `java/lang/Object` directly, which is always a sound (if imprecise) answer for stack map
/// frames.
pub trait ClassHierarchy: Send + Sync {
    /// Direct superclass of a class, `None` for `java/lang/Object`
    fn superclass(&self, class: &str) -> Option<&str>;

    /// Nearest class both arguments extend
    fn common_superclass(&self, class1: &str, class2: &str) -> String {
        if class1 == class2 {
            return class1.to_owned();
        }

        let mut ancestors = HashSet::new();
        let mut current = Some(class1);
        while let Some(class) = current {
            if !ancestors.insert(class) {
                break;
            }
            current = self.superclass(class);
        }

        let mut visited = HashSet::new();
        let mut current = Some(class2);
        while let Some(class) = current {
            if ancestors.contains(class) {
                return class.to_owned();
            }
            if !visited.insert(class) {
                break;
            }
            current = self.superclass(class);
        }

        String::from(JAVA_LANG_OBJECT)
    }
}

/// Hierarchy where every class extends `java/lang/Object` directly
#[derive(Debug, Default, Clone, Copy)]
pub struct ObjectHierarchy;

impl ClassHierarchy for ObjectHierarchy {
    fn superclass(&self, class: &str) -> Option<&str> {
        if class == JAVA_LANG_OBJECT {
            None
        } else {
            Some(JAVA_LANG_OBJECT)
        }
    }
}

/// Hierarchy supplied up front by the driver, as a map from class to superclass
#[derive(Debug, Default, Clone)]
pub struct StaticHierarchy {
    superclasses: HashMap<String, String>,
}

impl StaticHierarchy {
    pub fn new() -> StaticHierarchy {
        StaticHierarchy::default()
    }

    /// Record that `class` extends `superclass`
    pub fn insert(&mut self, class: impl Into<String>, superclass: impl Into<String>) {
        self.superclasses.insert(class.into(), superclass.into());
    }

    pub fn with(mut self, class: impl Into<String>, superclass: impl Into<String>) -> Self {
        self.insert(class, superclass);
        self
    }
}

impl ClassHierarchy for StaticHierarchy {
    fn superclass(&self, class: &str) -> Option<&str> {
        match self.superclasses.get(class) {
            Some(superclass) => Some(superclass.as_str()),
            None if class == JAVA_LANG_OBJECT => None,
            None => Some(JAVA_LANG_OBJECT),
        }
    }
}
