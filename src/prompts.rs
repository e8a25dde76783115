//! Prompt templates for the monologue and chat reactions.

const MONOLOGUE_TEMPLATE: &str = r#"Ты ведущий бесконечного философского стрима на Twitch. Ты говоришь вслух, без зрителей в студии, поэтому текст должен звучать как живая устная речь.

Темы, которые уже обсуждались (не повторяй их):
{history}

Тема этого выступления: {topic}

Требования:
- Связный монолог из 10-15 предложений.
- Только обычный текст: без списков, заголовков, эмодзи и разметки.
- Каждое предложение заканчивается точкой.
- В самом конце с новой строки напиши "{marker}" и одну новую тему для следующего выступления, логично вытекающую из этой.

Монолог:"#;

const REACTION_TEMPLATE: &str = r#"Ты ведущий философского стрима на Twitch. Сейчас ты рассуждаешь на тему: {topic}

Зритель {author} написал в чате: "{content}"

Ответь зрителю вслух, обращаясь к нему по имени. Одно-три коротких предложения, живо и дружелюбно, по возможности свяжи ответ с текущей темой. Только обычный текст, без эмодзи и разметки.

Ответ:"#;

/// Substitute `{name}` placeholders in one pass; inserted values are never rescanned.
fn fill(template: &str, values: &[(&str, &str)]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let value = after.find('}').and_then(|close| {
            let name = &after[..close];
            values.iter().find(|(key, _)| *key == name).map(|(_, value)| (*value, close))
        });
        match value {
            Some((value, close)) => {
                out.push_str(value);
                rest = &after[close + 1..];
            }
            None => {
                out.push('{');
                rest = after;
            }
        }
    }

    out.push_str(rest);
    out
}

/// Prompt for the next monologue. `history` is most-recent first.
pub fn build_monologue_prompt(history: &[String], topic: &str, marker: &str) -> String {
    let history = if history.is_empty() {
        "- (пока ничего)".to_string()
    } else {
        history.iter().map(|t| format!("- {t}")).collect::<Vec<_>>().join("\n")
    };

    fill(
        MONOLOGUE_TEMPLATE,
        &[("history", history.as_str()), ("topic", topic), ("marker", marker)],
    )
}

/// Prompt for a spoken reply to one chat message.
pub fn build_reaction_prompt(topic: &str, content: &str, author: &str) -> String {
    fill(
        REACTION_TEMPLATE,
        &[("topic", topic), ("author", author), ("content", content)],
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn monologue_prompt_lists_history_and_marker() {
        let history = vec!["Свобода воли".to_string(), "Смысл жизни".to_string()];
        let prompt = build_monologue_prompt(&history, "Что такое время?", "НОВАЯ ТЕМА:");

        assert!(prompt.contains("- Свобода воли\n- Смысл жизни"));
        assert!(prompt.contains("Тема этого выступления: Что такое время?"));
        assert!(prompt.contains("\"НОВАЯ ТЕМА:\""));
        assert!(!prompt.contains('{'));
    }

    #[test]
    fn monologue_prompt_without_history() {
        let prompt = build_monologue_prompt(&[], "X", "NEW TOPIC:");
        assert!(prompt.contains("(пока ничего)"));
    }

    #[test]
    fn placeholders_inside_values_stay_literal() {
        let history = vec!["Что такое {topic}?".to_string()];
        let prompt = build_monologue_prompt(&history, "Время", "{marker}");
        assert!(prompt.contains("- Что такое {topic}?"));
        assert!(prompt.contains("\"{marker}\""));

        let prompt = build_reaction_prompt("Кто такой {author}?", "{content}", "bob");
        assert!(prompt.contains("на тему: Кто такой {author}?"));
        assert!(prompt.contains("Зритель bob написал в чате: \"{content}\""));
    }

    #[test]
    fn unknown_braces_pass_through() {
        assert_eq!(fill("a {x} {b", &[("y", "1")]), "a {x} {b");
        assert_eq!(fill("{y}{y}", &[("y", "1")]), "11");
    }

    #[test]
    fn reaction_prompt_mentions_author_and_message() {
        let prompt = build_reaction_prompt("X", "hi", "bob");
        assert!(prompt.contains("Зритель bob написал в чате: \"hi\""));
        assert!(prompt.contains("на тему: X"));
    }
}
