//! Static doctor roster.

use serde::Serialize;

/// A doctor patients can book with.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub struct Doctor {
    pub name: &'static str,
    /// Avatar path served by the frontend
    pub image: &'static str,
}

pub const DOCTORS: &[Doctor] = &[
    Doctor {
        name: "John Green",
        image: "/assets/images/dr-green.png",
    },
    Doctor {
        name: "Leila Cameron",
        image: "/assets/images/dr-cameron.png",
    },
    Doctor {
        name: "David Livingston",
        image: "/assets/images/dr-livingston.png",
    },
    Doctor {
        name: "Evan Peter",
        image: "/assets/images/dr-peter.png",
    },
    Doctor {
        name: "Jane Powell",
        image: "/assets/images/dr-powell.png",
    },
    Doctor {
        name: "Alex Ramirez",
        image: "/assets/images/dr-remirez.png",
    },
    Doctor {
        name: "Jasmine Lee",
        image: "/assets/images/dr-lee.png",
    },
    Doctor {
        name: "Alyana Cruz",
        image: "/assets/images/dr-cruz.png",
    },
    Doctor {
        name: "Hardik Sharma",
        image: "/assets/images/dr-sharma.png",
    },
];

/// Look up a doctor by exact name.
pub fn find_doctor(name: &str) -> Option<&'static Doctor> {
    DOCTORS.iter().find(|doctor| doctor.name == name)
}
