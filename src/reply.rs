//! Template-based draft replies, keyed by category.
//!
//! Pure string formatting, no inference calls.

use crate::pipeline::types::Category;

const SIGNATURE: &str = "\n\nBest regards,\n[Your Name]";

/// Draft a reply for a message in `category` (a category label).
///
/// Spam gets an empty draft. Labels outside the category set, and the
/// no-readable-text sentinel, get a generic acknowledgment.
pub fn draft_reply(category: &str, sender: &str, _body: &str) -> String {
    let greeting = format!("Hi {},", display_name(sender));
    let line = match Category::from_label(category) {
        Some(Category::SpamPromotions) => return String::new(),
        Some(c) => category_line(c),
        None => None,
    };

    match line {
        Some(line) => format!("{greeting}\n\n{line}\n{SIGNATURE}"),
        None => format!("{greeting}\n\nReceived with thanks.\n{SIGNATURE}"),
    }
}

fn category_line(category: Category) -> Option<&'static str> {
    let line = match category {
        Category::ClassesLectures => {
            "Thank you for the update regarding the class. I have noted the details."
        }
        Category::ExamsAcademics => {
            "I have received the information about the exams. Thanks for letting me know."
        }
        Category::AssignmentsDeadlines => {
            "Message received. I will ensure to submit the assignment on time."
        }
        Category::PlacementsInternships => {
            "Thank you for this opportunity. I will review the details and apply accordingly."
        }
        Category::ClubActivities => "Sounds exciting! I'll check my calendar and try to be there.",
        Category::EventsWorkshops => "Thanks for the invitation. I look forward to the event.",
        Category::CompetitionsHackathons => "Count me in! I will check the rules and register.",
        Category::AdministrativeNotices => "Noted. Thank you for the information.",
        Category::FinanceFees => {
            "I have received the payment/fee notice. I will process it shortly."
        }
        Category::GeneralAnnouncements => "Thanks for the update.",
        Category::SpamPromotions | Category::NoReadableText => return None,
    };
    Some(line)
}

/// Display name from a `From` value: text before the first `<`, with quotes
/// and surrounding whitespace removed. Falls back to `"there"` when that
/// text is itself an address.
pub fn display_name(sender: &str) -> String {
    let head = sender.split('<').next().unwrap_or_default();
    let name = head.replace('"', "");
    let name = name.trim();
    if name.contains('@') {
        "there".to_string()
    } else {
        name.to_string()
    }
}
