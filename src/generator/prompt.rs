//! Built-in instruction texts.

use serde::{Deserialize, Serialize};

pub const SYSTEM_INSTRUCTION: &str = "You describe the image and generate keywords.";

pub const CAPTION_INSTRUCTION: &str = "Describe the image. Be specific";

/// Instruction for the combined description + keywords task.
pub const COMBINED_INSTRUCTION: &str = r#"The tasks are to describe the image and to come up with a large set of keyword tags for it.

Write the Description using the active voice.

The Keywords must be one or two words each. Generate as many Keywords as possible using a controlled and consistent vocabulary.

For both Description and Keywords, make sure to include:

 - Themes, concepts
 - Items, animals, objects
 - Structures, landmarks, setting
 - Foreground and background elements
 - Notable colors, textures, styles
 - Actions, activities

If humans are present, include:
 - Physical appearance
 - Gender
 - Clothing
 - Age range
 - Visibly apparent ancestry
 - Occupation/role
 - Relationships between individuals
 - Emotions, expressions, body language

Use ENGLISH only. Generate ONLY a JSON object with the keys Description and Keywords as follows {"Description": str, "Keywords": []}
<EXAMPLE>
The example input would be a stock photo of two apples, one red and one green, against a white backdrop and is a hypothetical Description and Keyword for a non-existent image.
OUTPUT=```json{"Description": "Two apples next to each other, one green and one red, placed side by side against a white background. There is even and diffuse studio lighting. The fruit is glossy and covered with droplets of water indicating they are fresh and recently washed. The image emphasizes the cleanliness and appetizing nature of the food", "Keywords": ["studio shot","green","fruit","red","apple","stock image","health food","appetizing","empty background","grocery","food","snack"]}```
</EXAMPLE> "#;

/// Instruction for the keywords-only task.
pub const KEYWORDS_INSTRUCTION: &str = r#"The task is to come up with a large set of keyword tags for the image.

The Keywords must be one or two words each. Generate as many Keywords as possible using a controlled and consistent vocabulary, covering themes, objects, setting, foreground and background elements, colors, textures, styles and activities. If humans are present, include appearance, clothing, age range, role, and expressions.

Use ENGLISH only. Generate ONLY a JSON object with the key Keywords as follows {"Keywords": []}
<EXAMPLE>
OUTPUT=```json{"Keywords": ["studio shot","green","fruit","red","apple","stock image","health food","appetizing","empty background","grocery","food","snack"]}```
</EXAMPLE> "#;

/// Instruction texts sent to the model, one per task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Instructions {
    pub system: String,
    pub combined: String,
    pub keywords: String,
    pub caption: String,
}

impl Default for Instructions {
    fn default() -> Self {
        Self {
            system: SYSTEM_INSTRUCTION.to_string(),
            combined: COMBINED_INSTRUCTION.to_string(),
            keywords: KEYWORDS_INSTRUCTION.to_string(),
            caption: CAPTION_INSTRUCTION.to_string(),
        }
    }
}
