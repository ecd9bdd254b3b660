//! 缺失目标的查询变体
//!
//! 补检专用：数字编号展开为同义写法族，着陆类关键词展开为固定同义词族，
//! 其余目标原样返回。变体按固定顺序生成并去重。

/// 着陆点同义词族：目标含 黑白 / 着陆 / 降落 / landing 之一时整族检索
const LANDING_FAMILY: [&str; 6] = [
    "黑白相间",
    "着陆点",
    "降落点",
    "黑白着陆标志",
    "landing pad",
    "黑白图案",
];

/// 为一个缺失目标生成检索变体
pub fn expand_variations(target: &str) -> Vec<String> {
    let target = target.trim();
    if target.is_empty() {
        return Vec::new();
    }

    let lower = target.to_lowercase();
    if target.contains("黑白")
        || target.contains("着陆")
        || target.contains("降落")
        || lower.contains("landing")
    {
        let mut v: Vec<String> = LANDING_FAMILY.iter().map(|s| s.to_string()).collect();
        push_unique(&mut v, target.to_string());
        return v;
    }

    if let Some(digits) = extract_digits(target) {
        let mut v = vec![
            digits.clone(),
            format!("{}号", digits),
            format!("编号{}", digits),
            format!("{} 号", digits),
            format!("点{}", digits),
        ];
        push_unique(&mut v, target.to_string());
        return v;
    }

    vec![target.to_string()]
}

/// 提取目标中的连续数字串（如 "7号" → "7"）；无数字返回 None
fn extract_digits(target: &str) -> Option<String> {
    let digits: String = target.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() {
        None
    } else {
        Some(digits)
    }
}

fn push_unique(v: &mut Vec<String>, item: String) {
    if !v.contains(&item) {
        v.push(item);
    }
}
