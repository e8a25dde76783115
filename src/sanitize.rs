//! Make model replies speakable by a Russian voice.
//!
//! Symbols a TTS engine would skip or mispronounce become words, Latin
//! letters are transliterated to Cyrillic, and the result is lowercased.

/// Spoken names for symbols. Sentence punctuation stays as-is.
const SYMBOL_WORDS: &[(char, &str)] = &[
    ('_', "нижнее подчеркивание"),
    ('@', "собака"),
    ('#', "решётка"),
    ('$', "доллар"),
    ('%', "процент"),
    ('&', "и"),
    ('*', "звёздочка"),
    ('+', "плюс"),
    ('=', "равно"),
    ('<', "меньше"),
    ('>', "больше"),
    ('/', "слэш"),
    ('\\', "обратный слэш"),
    ('|', "вертикальная черта"),
    ('~', "тильда"),
    ('^', "крышка"),
    ('`', ""),
    ('[', ""),
    (']', ""),
    ('{', ""),
    ('}', ""),
];

/// Latin letter sequences, longest first.
const DIGRAPHS: &[(&str, &str)] = &[
    ("shch", "щ"),
    ("sch", "щ"),
    ("zh", "ж"),
    ("kh", "х"),
    ("ts", "ц"),
    ("ch", "ч"),
    ("sh", "ш"),
    ("yu", "ю"),
    ("ya", "я"),
    ("yo", "ё"),
    ("ph", "ф"),
];

fn latin_letter(c: char) -> Option<&'static str> {
    Some(match c {
        'a' => "а",
        'b' => "б",
        'c' => "к",
        'd' => "д",
        'e' => "е",
        'f' => "ф",
        'g' => "г",
        'h' => "х",
        'i' => "и",
        'j' => "й",
        'k' => "к",
        'l' => "л",
        'm' => "м",
        'n' => "н",
        'o' => "о",
        'p' => "п",
        'q' => "к",
        'r' => "р",
        's' => "с",
        't' => "т",
        'u' => "у",
        'v' => "в",
        'w' => "в",
        'x' => "кс",
        'y' => "ы",
        'z' => "з",
        _ => return None,
    })
}

fn replace_symbols(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match SYMBOL_WORDS.iter().find(|(sym, _)| *sym == c) {
            Some((_, word)) => {
                out.push(' ');
                out.push_str(word);
                out.push(' ');
            }
            None => out.push(c),
        }
    }
    out
}

fn transliterate(text: &str) -> String {
    let lower = text.to_lowercase();
    let mut out = String::with_capacity(lower.len() * 2);
    let mut rest = lower.as_str();

    while let Some(c) = rest.chars().next() {
        if let Some((latin, cyrillic)) = DIGRAPHS.iter().find(|(latin, _)| rest.starts_with(latin)) {
            out.push_str(cyrillic);
            rest = &rest[latin.len()..];
            continue;
        }
        match latin_letter(c) {
            Some(cyrillic) => out.push_str(cyrillic),
            None => out.push(c),
        }
        rest = &rest[c.len_utf8()..];
    }
    out
}

/// Prepare generated text for speech synthesis.
pub fn speakable(text: &str) -> String {
    let replaced = replace_symbols(text);
    let transliterated = transliterate(&replaced);
    transliterated.split_whitespace().collect::<Vec<_>>().join(" ")
}
