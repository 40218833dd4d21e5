//! Policy preset vocabulary and prompt assembly. Grounded on
//! `original_source/app/config.py`'s `POLICY_PRESETS`/`ALLOW_POLICY_PRESETS`
//! constants and the prompt-building helpers `main.py` calls before invoking
//! the judge.

/// One block-policy toggle: a key persisted in `policy_flags_json`, a label
/// for display, and the prompt fragment appended to the judge system prompt
/// when the flag is enabled.
pub struct PolicyPreset {
    pub key: &'static str,
    pub label: &'static str,
    pub description: &'static str,
    pub prompt_addon: &'static str,
}

macro_rules! preset {
    ($key:expr, $label:expr, $description:expr, $prompt_addon:expr) => {
        PolicyPreset {
            key: $key,
            label: $label,
            description: $description,
            prompt_addon: $prompt_addon,
        }
    };
}

/// Blocklist-mode presets, in display order. From `config.py::POLICY_PRESETS`.
pub const POLICY_PRESETS: &[PolicyPreset] = &[
    preset!(
        "block_cocomelon",
        "Cocomelon",
        "Always block Cocomelon songs/videos/channels.",
        "ALWAYS BLOCK any content related to \"cocomelon\", including brand variants, channel names, thumbnails, and nursery-song compilations from this franchise."
    ),
    preset!(
        "block_nursery_factory",
        "Nursery Factory / Clone Kids Songs",
        "Block Cocomelon-like nursery-rhyme factory channels and clone content.",
        "ALWAYS BLOCK nursery-rhyme factory clone content, including repetitive toddler-song channels optimized for autoplay loops (for example: 'nursery rhymes', 'kids songs', 'for toddlers', and common clone channels)."
    ),
    preset!(
        "block_kids_clickbait_animals",
        "Kids Clickbait Animal Roleplay",
        "Block exploitative monkey/animal clickbait roleplay content.",
        "ALWAYS BLOCK exploitative animal roleplay clickbait aimed at kids (for example monkey-baby toilet/pool prank loops, distress bait, or repetitive shock thumbnails)."
    ),
    preset!(
        "block_skibidi",
        "Skibidi / Skibidi Toilet",
        "Brainrot-style chaotic meme animations.",
        "BLOCK if content strongly matches keywords like \"skibidi\" or \"skibidi toilet\"."
    ),
    preset!(
        "block_huggy_wuggy",
        "Huggy Wuggy / Poppy Playtime",
        "Toy-like horror monster content.",
        "BLOCK if content matches \"huggy wuggy\", \"poppy playtime\", or close variants."
    ),
    preset!(
        "block_rainbow_friends",
        "Rainbow Friends",
        "Roblox-like horror with jumpscares.",
        "BLOCK if content matches \"rainbow friends\" or similar horror gameplay for young kids."
    ),
    preset!(
        "block_siren_momo",
        "Siren Head / Momo",
        "Urban-legend horror characters.",
        "BLOCK if content matches \"siren head\", \"momo\", or related horror urban legends."
    ),
    preset!(
        "block_prank",
        "Prank",
        "Bullying, rude, staged conflict behavior.",
        "BLOCK prank-focused content, especially humiliation, bullying, or aggressive behavior."
    ),
    preset!(
        "block_challenge",
        "Challenge",
        "24-hour or dangerous challenge formats.",
        "BLOCK risky challenge content, including \"24 hour challenge\" and physically dangerous stunts."
    ),
    preset!(
        "block_granny",
        "Granny",
        "Horror game around violent granny character.",
        "BLOCK content matching the horror game \"granny\" and related clones."
    ),
    preset!(
        "block_fnaf",
        "FNAF / Five Nights at Freddy's",
        "Animatronic jumpscare horror.",
        "BLOCK content matching \"fnaf\", \"five nights at freddy\", or animatronic jumpscare themes."
    ),
    preset!(
        "block_unboxing_eggs",
        "Unboxing / Surprise Egg",
        "Pure consumerist toy-promo loops.",
        "BLOCK repetitive toy unboxing and surprise egg promotion content aimed at children."
    ),
    preset!(
        "block_kill_die",
        "Kill / Killing / Die",
        "Explicit violent title terms.",
        "BLOCK when titles/context emphasize words like \"kill\", \"killing\", or \"die\"."
    ),
    preset!(
        "block_blood_gore_horror",
        "Blood / Gore / Horror",
        "Visual violence and gore terms.",
        "BLOCK if blood, gore, or explicit horror violence is central to the content."
    ),
    preset!(
        "block_guns_weapons",
        "Guns / Shooting / Weapons",
        "Firearms/weapon-centered content.",
        "BLOCK if guns, shooting, or weapon-focused violence is a main theme."
    ),
    preset!(
        "block_elsagate_pregnant",
        "Pregnant (Elsagate)",
        "Fetish-like Elsagate mashups.",
        "BLOCK Elsagate-like content involving \"pregnant\" cartoon or superhero mashups."
    ),
    preset!(
        "block_elsagate_injection",
        "Injection / Doctor (Elsagate)",
        "Needles/operations in disturbing kid animations.",
        "BLOCK Elsagate-like content involving injections, needles, fake surgery, or forced doctor scenes."
    ),
    preset!(
        "block_suicide",
        "Suicide / Self-harm",
        "Self-harm and suicide themes.",
        "BLOCK any self-harm or suicide-related content immediately."
    ),
];

/// Whitelist-mode allow-profile presets, in display order. From
/// `config.py::ALLOW_POLICY_PRESETS`.
pub const ALLOW_POLICY_PRESETS: &[PolicyPreset] = &[
    preset!(
        "allow_90s_cartoons",
        "90s Cartoons",
        "Classic 1990s cartoons from major kids networks.",
        "ALLOW classic 1990s cartoons and franchise content aimed at children."
    ),
    preset!(
        "allow_00s_cartoons",
        "00s Cartoons",
        "Classic 2000s cartoons from major kids networks.",
        "ALLOW classic 2000s cartoons and age-appropriate animated series."
    ),
    preset!(
        "allow_all_cartoons",
        "All Cartoons",
        "Allow family-safe animation from trusted channels.",
        "ALLOW family-safe cartoons and animated shorts from trusted channels."
    ),
    preset!(
        "allow_disney_family",
        "Disney",
        "Disney and Disney Junior family-safe content.",
        "ALLOW family-safe Disney, Disney Junior, and Pixar-style kids content."
    ),
    preset!(
        "allow_educational",
        "Educational",
        "School-friendly educational content for kids.",
        "ALLOW educational content for children: literacy, math, science, geography, and life skills."
    ),
    preset!(
        "allow_religion",
        "Religion",
        "Age-appropriate faith and values content.",
        "ALLOW calm, age-appropriate faith and values content without fear-based messaging."
    ),
    preset!(
        "allow_pbs_kids",
        "PBS Kids Classics",
        "Trusted PBS-style educational shows.",
        "ALLOW PBS Kids style educational programming and classic learning shows."
    ),
    preset!(
        "allow_nickelodeon_90s",
        "Nickelodeon Classics",
        "Nickelodeon classics popular in the 1990s/2000s.",
        "ALLOW family-safe Nickelodeon classics suitable for young children."
    ),
    preset!(
        "allow_cartoon_network_classics",
        "Cartoon Network Classics",
        "Classic Cartoon Network shows and clips.",
        "ALLOW classic Cartoon Network family-safe cartoon content."
    ),
    preset!(
        "allow_disney_afternoon",
        "Disney Afternoon Classics",
        "DuckTales/TaleSpin-like classic Disney afternoon content.",
        "ALLOW Disney Afternoon style family-safe classics."
    ),
    preset!(
        "allow_animal_documentaries",
        "Animal Documentaries",
        "Calm, educational animal documentaries.",
        "ALLOW educational animal documentaries with calm narration and no distress bait."
    ),
    preset!(
        "allow_nature_science",
        "Nature & Science",
        "Nature, space, and science explainers for kids.",
        "ALLOW child-friendly nature, space, and science explainers."
    ),
    preset!(
        "allow_music_rhythm",
        "Music & Rhythm",
        "Age-appropriate music and rhythm learning.",
        "ALLOW age-appropriate music, rhythm, and movement learning content."
    ),
    preset!(
        "allow_arts_crafts",
        "Arts & Crafts",
        "Drawing, craft, and making videos for children.",
        "ALLOW arts and crafts tutorials suitable for children."
    ),
    preset!(
        "allow_storytelling_books",
        "Storytelling & Books",
        "Read-aloud and storytelling videos.",
        "ALLOW calm storytelling, read-aloud, and children's books content."
    ),
    preset!(
        "allow_family_game_shows",
        "Family Game Shows",
        "Family-friendly quiz and game formats.",
        "ALLOW child-friendly quiz and family game content without humiliation or risky challenges."
    ),
];

pub const SUPPORTED_TIMEZONES: &[&str] = &[
    "UTC",
    "Europe/Amsterdam",
    "Europe/Brussels",
    "Europe/London",
    "America/New_York",
    "America/Chicago",
    "America/Denver",
    "America/Los_Angeles",
    "Asia/Tokyo",
    "Australia/Sydney",
];

pub const DEFAULT_SPONSORBLOCK_CATEGORIES: &[&str] = &[
    "sponsor",
    "selfpromo",
    "interaction",
    "intro",
    "outro",
    "music_offtopic",
];

pub const DEFAULT_SAFE_PROMPT: &str = "You are Sentinel, a very strict child safety and anti-brainrot YouTube guardian for a 6-year-old child. \
Classify videos conservatively and prefer BLOCK on uncertainty. Always block highly stimulating, addictive, low-value spam, \
shouting, manipulative engagement loops, and age-inappropriate themes. \
Treat 'nursery-rhyme factory' videos (algorithmic toddler-song loops with bright overstimulating visuals, repetitive hooks, \
or copycat channels) as unsafe by default unless there is clear educational value and calm pacing. \
Treat exploitative animal roleplay/clickbait videos (for example monkey-baby prank/toilet/pool roleplay loops) as unsafe for children. \
Consider child safety, language, visuals, and educational value.";

pub const DEFAULT_WHITELIST_PROMPT: &str = "You are Sentinel in WHITELIST mode for a 6-year-old child. \
Only allow content that clearly matches the active allow-profile categories. \
If the video does not clearly fit those categories, return BLOCK. \
Prefer BLOCK on uncertainty.";

pub const OUTPUT_CONTRACT_SUFFIX: &str = "\n\nReturn ONLY valid JSON with this exact schema and keys: \
{\"verdict\":\"ALLOW\"|\"BLOCK\",\"reason\":\"string\",\"confidence\":0-100}. \
No markdown, no extra keys, no extra text.";

/// Looks a preset up by its persisted key. Used by [`crate::judge`] to
/// resolve labels for prompt addons and decision reasons.
pub fn find_preset<'a>(presets: &'a [PolicyPreset], key: &str) -> Option<&'a PolicyPreset> {
    presets.iter().find(|p| p.key == key)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preset_catalogs_have_unique_keys() {
        let mut keys: Vec<&str> = POLICY_PRESETS.iter().map(|p| p.key).collect();
        keys.sort_unstable();
        let mut dedup = keys.clone();
        dedup.dedup();
        assert_eq!(keys.len(), dedup.len());

        let mut allow_keys: Vec<&str> = ALLOW_POLICY_PRESETS.iter().map(|p| p.key).collect();
        allow_keys.sort_unstable();
        let mut allow_dedup = allow_keys.clone();
        allow_dedup.dedup();
        assert_eq!(allow_keys.len(), allow_dedup.len());
    }

    #[test]
    fn find_preset_looks_up_by_key() {
        let found = find_preset(POLICY_PRESETS, "block_cocomelon").unwrap();
        assert_eq!(found.label, "Cocomelon");
        assert!(find_preset(POLICY_PRESETS, "not_a_real_preset").is_none());
    }
}
