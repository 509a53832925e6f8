//! Ready-made templates with matching data.

/// A sample template and the JSON data it renders against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sample {
    /// Short identifier, e.g. `loops`
    pub slug: &'static str,
    pub name: &'static str,
    pub description: &'static str,
    pub template: &'static str,
    pub data: &'static str,
}

macro_rules! sample {
    ($slug:literal, $name:literal, $description:literal) => {
        Sample {
            slug: $slug,
            name: $name,
            description: $description,
            template: include_str!(concat!("../samples/", $slug, ".ejs")),
            data: include_str!(concat!("../samples/", $slug, ".json")),
        }
    };
}

pub static SAMPLES: [Sample; 5] = [
    sample!(
        "basic-variables",
        "Basic Variables",
        "Simple variable interpolation"
    ),
    sample!(
        "conditionals",
        "Conditionals",
        "If/else statements and logical operators"
    ),
    sample!("loops", "Loops & Arrays", "Iterating over arrays with forEach"),
    sample!(
        "complex-data",
        "Complex Data",
        "Nested objects and advanced templating"
    ),
    sample!("email", "Email Template", "Professional email newsletter template"),
];

/// All samples, in menu order.
pub fn all() -> &'static [Sample] {
    &SAMPLES
}

/// Look a sample up by slug or by display name, ignoring case.
pub fn find(name: &str) -> Option<&'static Sample> {
    SAMPLES.iter().find(|sample| {
        sample.slug.eq_ignore_ascii_case(name) || sample.name.eq_ignore_ascii_case(name)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn samples_are_found_by_slug_or_name() {
        assert_eq!(find("loops").map(|s| s.name), Some("Loops & Arrays"));
        assert_eq!(find("email template").map(|s| s.slug), Some("email"));
        assert!(find("nope").is_none());
    }
}
