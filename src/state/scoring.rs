//! Pure scoring rules applied when a question's answer is revealed.

/// Points awarded for any correct answer before bonuses.
pub const BASE_POINTS: u32 = 1;

/// Outcome of scoring one participant for one question.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoundScore {
    /// Whether the submitted answer matched the correct one.
    pub is_correct: bool,
    /// Streak after this question.
    pub streak: u32,
    /// Bonus points earned from the streak this round.
    pub streak_bonus: u32,
    /// Total points earned this round (base plus bonus).
    pub points: u32,
}

/// Exact, case- and whitespace-sensitive comparison against the correct answer.
pub fn evaluate(answer: &str, correct_answer: &str) -> bool {
    answer == correct_answer
}

/// Bonus points granted for reaching `streak` consecutive correct answers.
///
/// | streak | bonus |
/// |--------|-------|
/// | 0..=2  | 0     |
/// | 3..=4  | 1     |
/// | 5..=9  | 2     |
/// | 10..   | 5     |
pub fn streak_bonus(streak: u32) -> u32 {
    match streak {
        10.. => 5,
        5..=9 => 2,
        3..=4 => 1,
        _ => 0,
    }
}

/// Score a single answer given the participant's streak before this question.
///
/// A missing answer counts as incorrect and resets the streak.
pub fn score_answer(
    answer: Option<&str>,
    correct_answer: &str,
    previous_streak: u32,
    streak_bonus_enabled: bool,
) -> RoundScore {
    let is_correct = answer.is_some_and(|answer| evaluate(answer, correct_answer));
    if !is_correct {
        return RoundScore {
            is_correct,
            streak: 0,
            streak_bonus: 0,
            points: 0,
        };
    }

    let streak = previous_streak.saturating_add(1);
    let bonus = if streak_bonus_enabled {
        streak_bonus(streak)
    } else {
        0
    };

    RoundScore {
        is_correct,
        streak,
        streak_bonus: bonus,
        points: BASE_POINTS + bonus,
    }
}
