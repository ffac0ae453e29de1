//! Fixed token families used by sanitization and violation detection.
//!
//! Thresholds are configurable; these lists are not. Every family is a
//! plain slice so callers can build matchers once and reuse them.

/// Characters that split a CJK run into segments
pub const FUNCTION_CHARS: &[char] = &[
    '的', '了', '着', '和', '与', '并', '在', '把', '被', '将', '也', '又', '就', '而', '及', '或',
    '之', '向', '对', '从', '给', '去', '是', '让', '使', '还', '再',
];

/// Connective and filler words excluded from keyword extraction
pub const STOPWORDS: &[&str] = &[
    "然后", "但是", "因为", "所以", "如果", "虽然", "而且", "并且", "或者", "于是", "这个", "那个",
    "一个", "一些", "这些", "那些", "已经", "开始", "之后", "之前", "时候", "没有", "不是", "就是",
    "还是", "可以", "什么", "怎么", "如何", "本章", "下一章", "章节", "主要", "进行", "通过", "发生",
    "出现", "继续", "最终", "同时", "其中", "以及", "终于", "随后", "接着", "一起", "一切", "自己",
    "他们", "她们", "我们", "你们", "the", "and", "of", "to", "in", "with", "then",
];

/// Common narrative nouns that look like names but are not characters
pub const NAME_STOPLIST: &[&str] = &[
    "身份", "真相", "线索", "秘密", "事情", "消息", "时间", "地方", "房间", "众人", "对方", "事件",
    "问题", "目标", "结果", "原因", "情况", "关系", "心中", "内心", "所有人", "一切", "自己", "他们",
    "她们", "我们", "你们", "这里", "那里", "此时", "当时", "之后", "最后", "故事", "本章", "下一章",
];

/// Contact / interview verbs
pub const ACTION_CONTACT: &[&str] = &[
    "采访", "拜访", "约见", "联系", "联络", "询问", "审问", "盘问", "见面", "会面", "接触", "面谈",
    "对质",
];

/// Evidence / testimony verbs
pub const ACTION_EVIDENCE: &[&str] = &[
    "证据", "证词", "作证", "指认", "口供", "供述", "确认", "证实", "找到", "取得", "拿到", "揭露",
    "揭穿", "曝光",
];

/// Arrival / execution verbs
pub const ACTION_ARRIVAL: &[&str] = &[
    "抵达", "到达", "进入", "潜入", "赶到", "执行", "行动", "动手", "突袭", "闯入", "逮捕", "救出",
    "摊牌",
];

/// All cross-chapter action families, in detection order
pub const ACTION_FAMILIES: &[&[&str]] = &[ACTION_CONTACT, ACTION_EVIDENCE, ACTION_ARRIVAL];

/// Completed or contacted actions (as opposed to planned ones)
pub const HARD_EXECUTION: &[&str] = &[
    "采访了", "见到", "见面了", "找到", "拿到", "取得", "确认了", "证实", "指认", "抵达", "到达",
    "进入", "潜入", "执行", "动手", "逮捕", "救出", "摊牌", "揭穿", "曝光", "完成",
];

/// Intent / preparation language allowed in a tail hook
pub const SOFT_HOOKS: &[&str] = &[
    "决定", "打算", "准备", "计划", "筹划", "试图", "想要", "意识到", "预感", "酝酿", "约定", "盘算",
    "决心", "暗自", "隐约", "察觉", "悬念", "伏笔", "即将",
];

/// Every lexicon word that segmentation isolates as its own token.
/// Perfective forms (`采访了`) are skipped so the bare verb is isolated
/// and the particle falls away as a function character.
pub fn isolated_words() -> impl Iterator<Item = &'static str>
{
    ACTION_FAMILIES
        .iter()
        .flat_map(|family| family.iter())
        .chain(HARD_EXECUTION.iter())
        .chain(SOFT_HOOKS.iter())
        .copied()
        .filter(|w| !w.ends_with('了'))
}

/// True if any member of `family` occurs in `text`
pub fn contains_any(
    text: &str,
    family: &[&str],
) -> bool
{
    family
        .iter()
        .any(|w| text.contains(w))
}
