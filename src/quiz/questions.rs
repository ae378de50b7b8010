//! The fixed question bank and the answer category tags.

/// Answer category. Every question offers exactly one option per category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    A,
    B,
    C,
}

impl Category {
    /// All categories in option order.
    pub const ALL: [Category; 3] = [Category::A, Category::B, Category::C];

    /// Parse a callback tag (`"a"`, `"b"` or `"c"`). Anything else is rejected.
    pub fn parse(tag: &str) -> Option<Self> {
        match tag {
            "a" => Some(Self::A),
            "b" => Some(Self::B),
            "c" => Some(Self::C),
            _ => None,
        }
    }

    /// The wire tag carried in button payloads.
    pub fn tag(&self) -> &'static str {
        match self {
            Self::A => "a",
            Self::B => "b",
            Self::C => "c",
        }
    }

    /// Position of this category's option within a question.
    pub fn index(&self) -> usize {
        match self {
            Self::A => 0,
            Self::B => 1,
            Self::C => 2,
        }
    }

    /// Lowercase letter used in button labels.
    pub fn letter(&self) -> char {
        match self {
            Self::A => 'a',
            Self::B => 'b',
            Self::C => 'c',
        }
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.tag())
    }
}

/// One multiple-choice question.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Question {
    pub prompt: &'static str,
    /// Options indexed by [`Category::index`].
    pub options: [&'static str; 3],
}

impl Question {
    /// Option text for a category.
    pub fn option(&self, category: Category) -> &'static str {
        self.options[category.index()]
    }

    /// `"<letter>) <option text>"` labels, one per category, in order.
    pub fn button_labels(&self) -> [(Category, String); 3] {
        Category::ALL.map(|c| (c, format!("{}) {}", c.letter(), self.option(c))))
    }
}

/// Number of questions in a complete quiz.
pub const QUESTION_COUNT: usize = 10;

/// The question bank, asked in this order.
pub const QUESTIONS: [Question; QUESTION_COUNT] = [
    Question {
        prompt: "1. What have you been feeling most often lately?",
        options: [
            "Stability and calm",
            "Mild anxiety, dissatisfaction",
            "Pain, confusion, emptiness",
        ],
    },
    Question {
        prompt: "2. How do you usually cope with difficult feelings?",
        options: [
            "I just rest",
            "Alcohol, drugs, other addictions",
            "I need to talk and feel supported",
        ],
    },
    Question {
        prompt: "3. How important is it for you to be part of a growth-oriented community?",
        options: [
            "Not very important",
            "Interesting, if there is something useful in it",
            "Very important, I miss that",
        ],
    },
    Question {
        prompt: "4. How do you feel about self-development and working on yourself?",
        options: [
            "Skeptical",
            "Sometimes interested",
            "It is important and necessary",
        ],
    },
    Question {
        prompt: "5. Are you ready to do short exercises in self-reflection?",
        options: [
            "No",
            "If I have the time",
            "Yes, I love it, I need it",
        ],
    },
    Question {
        prompt: "6. How relevant to you are topics like confidence, self-acceptance, sexuality, guilt and past trauma?",
        options: [
            "They barely concern me",
            "They come up sometimes",
            "They resonate strongly",
        ],
    },
    Question {
        prompt: "7. Would you invest a small amount (say $10 a month) in a community that gives you support and growth?",
        options: [
            "No, I don't pay for things like that",
            "Maybe, if I see the value",
            "Yes, I consider it a good investment",
        ],
    },
    Question {
        prompt: "8. Which format suits you best?",
        options: [
            "Working on myself independently",
            "Something that will guide me",
            "I need a good mentor",
        ],
    },
    Question {
        prompt: "9. What do you need most right now?",
        options: [
            "Nothing, I'm fine",
            "Support and understanding",
            "Tools for working on myself",
        ],
    },
    Question {
        prompt: "10. Would you also like to help others?",
        options: [
            "No, not right now",
            "Yes, but I don't know how",
            "I already do",
        ],
    },
];

/// Look up a question by step.
pub fn question(step: usize) -> Option<&'static Question> {
    QUESTIONS.get(step)
}
