// ==========================================
// 国际化 (i18n) 模块
// ==========================================
// 使用 rust-i18n 库
// 支持葡萄牙语（默认,工厂现场语言）和中文
// ==========================================
// 注意: rust_i18n::i18n! 宏已在 lib.rs 中初始化
// ==========================================

/// 获取当前语言
pub fn current_locale() -> String {
    rust_i18n::locale().to_string()
}

/// 设置语言
///
/// # 参数
/// - locale: 语言代码（"pt-BR" 或 "zh-CN"）
pub fn set_locale(locale: &str) {
    rust_i18n::set_locale(locale);
}

/// 翻译消息（无参数）
///
/// # 示例
/// ```no_run
/// use shopfloor_tracking::i18n::t;
/// let msg = t("machine.id_required");
/// ```
pub fn t(key: &str) -> String {
    rust_i18n::t!(key).to_string()
}

/// 翻译消息（带参数）
///
/// # 示例
/// ```no_run
/// use shopfloor_tracking::i18n::t_with_args;
/// let msg = t_with_args("turno.faixa_invalida", &[("inicio", "06:00"), ("fim", "14:00")]);
/// ```
pub fn t_with_args(key: &str, args: &[(&str, &str)]) -> String {
    let mut result = rust_i18n::t!(key).to_string();
    for (k, v) in args {
        let placeholder = format!("%{{{}}}", k);
        result = result.replace(&placeholder, v);
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    // rust-i18n 的 locale 为全局状态，且 Rust 测试默认并行执行；
    // 为避免测试互相干扰，这里对 i18n 相关测试串行化。
    static LOCALE_TEST_LOCK: Mutex<()> = Mutex::new(());

    #[test]
    fn test_default_locale() {
        let _guard = LOCALE_TEST_LOCK.lock().unwrap();
        // 显式设置为默认语言
        set_locale("pt-BR");
        assert_eq!(current_locale(), "pt-BR");
    }

    #[test]
    fn test_set_locale() {
        let _guard = LOCALE_TEST_LOCK.lock().unwrap();
        // 测试切换语言
        set_locale("pt-BR");
        assert_eq!(current_locale(), "pt-BR");

        set_locale("zh-CN");
        assert_eq!(current_locale(), "zh-CN");

        // 恢复默认语言
        set_locale("pt-BR");
    }

    #[test]
    fn test_translate_simple() {
        let _guard = LOCALE_TEST_LOCK.lock().unwrap();
        // 测试葡萄牙语翻译
        set_locale("pt-BR");
        let msg = t("machine.id_required");
        assert_eq!(msg, "machine_id é obrigatório");

        // 测试中文翻译
        set_locale("zh-CN");
        let msg = t("machine.id_required");
        assert_eq!(msg, "machine_id 不能为空");

        // 恢复默认语言
        set_locale("pt-BR");
    }

    #[test]
    fn test_translate_with_args() {
        let _guard = LOCALE_TEST_LOCK.lock().unwrap();
        // 测试葡萄牙语翻译（带参数）
        set_locale("pt-BR");
        let msg = t_with_args("turno.faixa_invalida", &[("inicio", "6h"), ("fim", "14h")]);
        assert!(msg.contains("6h - 14h"));
        assert!(msg.contains("Faixa de turno inválida"));

        // 测试中文翻译（带参数）
        set_locale("zh-CN");
        let msg = t_with_args("turno.faixa_invalida", &[("inicio", "6h"), ("fim", "14h")]);
        assert!(msg.contains("6h - 14h"));
        assert!(msg.contains("班次时间范围无效"));

        // 恢复默认语言
        set_locale("pt-BR");
    }
}
