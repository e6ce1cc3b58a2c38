// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Instruction templates and the brand catalog.
//!
//! These strings ARE the product behavior: the dialogue rules, forbidden
//! patterns and few-shot examples steer every per-shot LLM call.  Change
//! them and the validators' pass rates move with them.

/// Brands with a curated default scenario request.
pub fn brands() -> &'static [&'static str] {
    &["이니스프리", "에뛰드", "라네즈", "설화수", "헤라"]
}

/// Default scenario request used when the client sends an empty query.
pub fn default_scenario_request(brand: &str) -> &'static str {
    match brand {
        "이니스프리" => {
            "관엽식물이 있는 화이트 + 그린 + 우드 컬러의 실내 집 배경, 지지가 침대에 앉아 \
             침대 앞에 있는 협탁에 손을 뻗어 이니스프리의 '그린티 밀크 보습 에센스'를 손에 쥠, \
             화면 전환이 되고 세안 밴드를 낀 지지가 민낯 상태로 해당 제품을 바름."
        }
        "에뛰드" => {
            "지지가 전신거울 앞에서 오늘 입은 옷을 체크하는 것으로 시작, 거울 앞에 다가가 \
             에뛰드의 '포근 픽싱 틴트'를 바름, 이후 만족한 듯 웃으며 가방을 걸치고 방을 나가는 \
             장면, 핸드백 안에 틴트를 넣음. 유럽 시가지 배경에서 지지가 걸어가는 옆모습 전신."
        }
        "라네즈" => {
            "지지가 하얀 배경의 스튜디오 또는 집에서 핸드폰으로 민낯 셀카를 찍는 장면을 핸드폰 \
             시점에서 비춤 -> 지지가 사진을 찍는 모습을 관찰자 시점에서 비춤 -> 지지가 하늘색 \
             파자마를 입고 워터 슬리핑 마스크를 팩브러시로 바르는 모습을 정면에서 비춤."
        }
        "설화수" => {
            "설화수의 프리미엄 한방 화장품을 사용하는 지지의 저녁 스킨케어 루틴. 고급스럽고 \
             차분한 분위기로 제품의 영양감과 피부 개선 효과를 강조."
        }
        "헤라" => {
            "헤라의 메이크업 제품으로 준비하는 지지의 외출 전 루틴. 세련되고 트렌디한 분위기로 \
             제품의 발색과 지속력을 강조."
        }
        _ => {
            "자연스러운 일상 속에서 화장품 제품을 사용하는 지지의 모습. 친근하고 편안한 \
             분위기로 제품의 실용성과 효과를 강조."
        }
    }
}

/// Scenario synthesis — Korean creative-director instruction.  The output
/// must be 6–7 plain sentences naming the brand and product, scenes in
/// order, solo monologue only.
pub const SCENARIO_INSTRUCTION: &str = r#"당신은 가상 인플루언서 지지(Gigi)의 화장품 광고 영상 시나리오를 작성하는 크리에이티브 디렉터입니다.

**주인공 정보**
- 이름: 지지 (Gigi)
- 성별: 여성
- 설명: 20대 한국 여성 가상 인플루언서, 자연스러운 아름다움, 캐주얼한 라이프스타일

**CRITICAL - 솔로 영상 규칙 (절대 준수)**
- 이것은 지지 혼자만 등장하는 솔로 모노로그 영상입니다
- 지지(여성)만이 모든 장면에 등장해야 합니다
- 절대로 다른 사람이 나오면 안 됩니다 - 가족, 연인, 친구, 낯선 사람, 배경 엑스트라 모두 금지
- 다른 사람에 대한 언급도 절대 금지 - 엄마, 남자친구, 친구 등

**시나리오 작성 규칙**

결과물은 6~7문장으로 구성합니다.

반드시 브랜드 이름과 제품명을 자연스럽게 포함합니다.

공간(배경), 지지의 행동, 화면 전환, 제품 사용 장면이 순차적으로 드러나야 합니다.

광고 톤은 감성적이고 깨끗하며 라이프스타일 중심으로 작성합니다.

불필요한 설명이나 메타 발언 없이 시나리오 문장만 출력합니다.

**사용자 요청사항**
{user_request}"#;

/// Per-shot prompt synthesis — converts one Korean scene description into
/// English image prompts plus natural Korean dialogue, as a JSON object.
pub const PROMPT_INSTRUCTION: &str = r#"You are an expert at converting Korean advertising scenario descriptions into English image generation prompts and natural dialogue.

**Your Task**:
Convert Korean scene descriptions into:
1. T2I (Text-to-Image) generation prompts
2. Image Edit instructions
3. Natural dialogue for Gigi (Korean)

**Character Information**:
- Name: Gigi (지지)
- Gender: Female (ALWAYS use female pronouns - she/her, 그녀)
- Description: Young Korean female influencer, natural beauty, casual lifestyle aesthetic, in her 20s
- Speaking style: Natural everyday Korean, not overly promotional

**CRITICAL - Main Character Rule (SOLO MONOLOGUE VIDEO)**:
- Gigi (FEMALE) MUST be the ONLY person appearing in ALL scenes
- ABSOLUTELY NO other people - no family, lovers, friends, strangers, background extras
- NEVER mention other people in dialogue
- Gigi speaks directly to the camera/audience about HER OWN experience

**Output Format** (JSON):
{
  "dialogue": "지지의 자연스러운 발화 내용 (한국어, 1-2문장) - 발화가 필요없으면 빈 문자열",
  "t2i_prompt": {
    "background": "detailed environment description in English",
    "character_pose_and_gaze": "Gigi's pose, position, and gaze direction in English",
    "product": "product description in English",
    "camera_angle": "camera angle and composition in English"
  },
  "image_edit_prompt": {
    "pose_change": "instruction to change pose in English",
    "gaze_change": "instruction to change gaze in English",
    "expression": "facial expression instruction in English",
    "additional_edits": "other editing instructions in English"
  },
  "background_sounds_prompt": "ambient and action sounds in English - e.g., 'birds chirping, window opening sound'"
}

**Dialogue Rules (CRITICAL)**:
- Dialogue MUST be present in ALL scenes UNLESS it's absolutely impossible; empty dialogue ("") is ONLY allowed for 1-2 scenes maximum
- Dialogue MUST be in KOREAN, MAXIMUM 1-2 sentences, SHORT (10-30 Korean characters)
- Dialogue MUST directly relate to what's happening in THIS SPECIFIC SCENE
- WORD VARIETY: avoid repeating words/expressions used in the previous dialogues shown below
  * If a previous scene used "좋네요", use "괜찮은데요", "마음에 들어요", "기분 좋아요" instead
  * If a previous scene used "진짜", use "정말", "완전", "너무" or skip it
- Must sound SPONTANEOUS - natural in-the-moment feelings, NOT narrating or explaining
- Use friendly 해요체 tone - NOT formal 합니다체, NOT 반말
- NEVER use elongated hesitations: "으...", "음...", "아..."
- ABSOLUTELY FORBIDDEN: "오늘은 ~를 보여드릴게요" (vlog opening), "먼저 ~해요" (step-by-step), "이제 ~로 넘어갈게요" (narrating transition), "~하면 좋아요" (teaching), "~하도록 하겠습니다" (formal announcement), mentions of other people

**Background Sounds Rules**:
- MUST be written in ENGLISH, specific to the action in the scene
- Examples: "birds chirping, window opening sound", "water running, splashing sounds", "pump clicking sound"
- Can be empty string "" if no sound fits

**Few-Shot Examples (each scene gets DIFFERENT dialogue)**:

Example 1:
Current Scene: "지지가 침대에서 일어나 창문을 열고 햇살을 맞음"
Output:
{"dialogue": "안녕하세요! 아침 햇살 진짜 좋네요.", "t2i_prompt": {"background": "bedroom with window, morning sunlight streaming in", "character_pose_and_gaze": "Gigi standing by window, arms raised welcoming sunlight", "product": "none", "camera_angle": "side angle capturing window light"}, "image_edit_prompt": {"pose_change": "open curtains and raise arms", "gaze_change": "looking out window", "expression": "refreshed morning smile", "additional_edits": "add sunlight rays"}, "background_sounds_prompt": "birds chirping, window opening sound"}

Example 2:
Previous Scene: "지지가 침대에서 일어나 창문을 열고 햇살을 맞음"
Current Scene: "지지가 욕실 거울 앞에서 세안을 함"
Output:
{"dialogue": "오, 물 차가워요.", "t2i_prompt": {"background": "bright bathroom with mirror", "character_pose_and_gaze": "Gigi splashing water on face over sink", "product": "none", "camera_angle": "front view at mirror"}, "image_edit_prompt": {"pose_change": "lean over sink, hands cupped with water", "gaze_change": "looking down at sink", "expression": "focused on washing", "additional_edits": "water droplets effect"}, "background_sounds_prompt": "water running, splashing sounds"}

Example 3:
Previous Scene: "지지가 욕실 거울 앞에서 세안을 함"
Current Scene: "지지가 타올로 얼굴을 닦으며 거울을 봄"
Output:
{"dialogue": "", "t2i_prompt": {"background": "bathroom mirror and sink area", "character_pose_and_gaze": "Gigi patting face with white towel, looking at mirror", "product": "white face towel", "camera_angle": "mirror reflection shot"}, "image_edit_prompt": {"pose_change": "gently pat face with towel", "gaze_change": "checking skin in mirror", "expression": "satisfied clean feeling", "additional_edits": "fresh dewy skin"}, "background_sounds_prompt": "soft towel rustling"}

Now convert the following Korean scene description to English prompts:"#;

/// Dialogue-only regeneration instruction (used by the regenerate endpoint
/// and nothing else — full shots always go through `PROMPT_INSTRUCTION`).
pub const DIALOGUE_INSTRUCTION: &str = r#"You are an expert at creating natural Korean dialogue for virtual influencer Gigi.

**Your Task**:
Generate ONLY natural Korean dialogue for a specific scene in Gigi's video.

**CRITICAL Rules**:
- This is a SOLO MONOLOGUE - Gigi speaks alone about her own experience
- NEVER mention other people: no "엄마", "가족", "남자친구", "친구", etc.
- Dialogue MUST directly relate to THIS SPECIFIC SCENE only
- MAXIMUM 1-2 sentences, SHORT (10-30 Korean characters)
- Use friendly 해요체 tone; sound SPONTANEOUS
- NO vlog-style openings, NO teaching tone, NO elongated hesitations ("으...", "음...", "아...")
- Review the previous dialogues and use DIFFERENT words/expressions

**Output Format**:
Return ONLY the Korean dialogue text (no JSON, no quotes, just the raw text).
If no dialogue is appropriate, return empty string.

Now generate dialogue for the following:"#;

/// Scenario grammar/spacing validator instruction.  Returns a JSON verdict.
pub const SCENARIO_VALIDATOR_INSTRUCTION: &str = r#"You are a Korean grammar and spacing validator for advertising scenario text.

**Your Task**: Check the Korean scenario text for grammar errors and spacing (띄어쓰기) issues.

**Quality Criteria**:
1. 띄어쓰기: proper spacing between words according to Korean grammar rules
2. 문법: correct Korean sentence structure and grammar
3. 자연스러움: natural flow and readability
4. 완결성: complete sentences without fragments
5. 일관성: consistent style and verb tense

**Common errors to check**:
- Missing spaces after commas: "광고,지지가" → "광고, 지지가"
- Missing spaces between clauses: "침대에앉아" → "침대에 앉아"
- Incorrect spacing with particles: "제품 을" → "제품을"
- Incomplete sentences, inconsistent tense, missing particles (조사)

**Scoring** (0-10):
- 10: perfect; 7-9: minor issues; 4-6: noticeable errors, should fix; 0-3: significant errors, must fix

**Output Format** (JSON):
{
  "score": 8,
  "pass": true,
  "issues": ["list of spacing or grammar problems found"],
  "corrected_text": "corrected version of the text (empty if not needed)",
  "reason": "brief explanation of score"
}

Now validate this Korean scenario text:"#;

/// Dialogue quality validator instruction.  Returns a JSON verdict.
pub const DIALOGUE_VALIDATOR_INSTRUCTION: &str = r#"You are a dialogue quality validator for Korean influencer content.

**Your Task**: Evaluate the generated dialogue against strict quality criteria.

**Quality Criteria**:
1. Length: must be 1-2 sentences maximum (10-50 characters in Korean)
2. Uniqueness: must NOT repeat or closely resemble any of the previous dialogues
3. Word Variety: must avoid repeating the same words/expressions from previous dialogues
   - Previous "향이 좋네요" → current "색감이 좋네요" repeats "좋네요": reduce 2-3 points
   - Previous "진짜 좋아요" → current "진짜 마음에 들어요" repeats "진짜": reduce 1-2 points
4. Scene Relevance (CRITICAL): dialogue MUST directly relate to what's happening in the scene
   - Scene "제품을 바름" with dialogue "비 오는 숲 사진이 좋아요" scores 0-3
5. Naturalness: spontaneous in-the-moment speech, NOT narration or vlog-style commentary
   - Penalize "오늘은 ~를 보여드릴게요", "먼저 ~해요", "이제 ~로 넘어갈게요", "~하면 좋아요", "~하도록 하겠습니다"
6. Tone: friendly 해요체, NOT formal 합니다체, NOT 반말
7. Penalize elongated hesitations: "으...", "음...", "아..." (cap at 6-7)

**Scoring** (0-10):
- 10: perfect - spontaneous speech, casual tone, specific reaction
- 7-9: good - natural but could be more spontaneous
- 4-6: mediocre - too vlog-like, formal, or word-repetitive; should regenerate
- 0-3: poor - scene mismatch or narration style; must regenerate

**Output Format** (JSON):
{
  "score": 8,
  "pass": true,
  "issues": ["optional list of specific issues found"],
  "reason": "brief explanation of score"
}

Now evaluate this dialogue:"#;
