//! 两阶段的标签应用：先全量校验，再按序写入，可选的故障补偿回滚。
//!
//! 独立于传输与 JSON 层：输入是类型化的修改列表和回滚开关，
//! 输出是结构化的应用结果。

use api_contract::TagValueUpdate;
use domain::TagValueData;
use tracing::{error, info, warn};
use twc_device::TagStore;
use twc_telemetry::record_tag_update_rollback;

/// 应用结果。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// 全部条目已写入。
    Success,
    /// 列表中存在设备上不存在的标签；未写入任何值。
    MissingTags,
    /// 列表中存在类型不匹配的标签；未写入任何值。
    TypeMismatch,
    /// 写入阶段失败；剩余条目已放弃，回滚（如启用）已尽力执行。
    ApplyFail,
}

/// 校验并应用一组标签修改。
///
/// 第一阶段校验每个条目：命名标签必须存在于设备且实际类型与声明一致，
/// 任一条目失败则不写入任何标签。第二阶段按数组顺序写入；启用
/// `restore_on_fault` 时每个标签写入前先捕获旧值，任一写入失败即放弃
/// 剩余条目，并把本次已写入的标签逐个写回旧值（尽力而为：单个回滚
/// 失败记录日志后继续其余回滚）。
pub async fn apply_tag_updates(
    tags: &dyn TagStore,
    updates: &[TagValueUpdate],
    restore_on_fault: bool,
) -> ApplyOutcome {
    // 第一阶段：全量校验，缺失标签优先于类型不匹配。
    let mut any_missing = false;
    let mut any_mismatched = false;
    for update in updates {
        match tags.find_tag(&update.name).await {
            Ok(Some(info)) => {
                if info.data_type != update.data_type {
                    warn!(
                        target: "twc.tagupdate",
                        tag = %update.name,
                        declared = update.data_type.wire_name(),
                        actual = info.data_type.wire_name(),
                        "tag update response contains a tag with mismatched types, nothing will be applied"
                    );
                    any_mismatched = true;
                }
            }
            Ok(None) => {
                warn!(
                    target: "twc.tagupdate",
                    tag = %update.name,
                    "tag update response contains a tag that does not exist, nothing will be applied"
                );
                any_missing = true;
            }
            Err(err) => {
                warn!(
                    target: "twc.tagupdate",
                    tag = %update.name,
                    error = %err,
                    "unable to look up a tag from a tag update response, nothing will be applied"
                );
                any_missing = true;
            }
        }
    }
    if any_missing {
        return ApplyOutcome::MissingTags;
    }
    if any_mismatched {
        return ApplyOutcome::TypeMismatch;
    }

    // 第二阶段：按数组顺序应用。
    let mut previous_values: Vec<(String, TagValueData)> = Vec::new();
    let mut apply_failed = false;
    for update in updates {
        if restore_on_fault {
            match tags.read_value(&update.name).await {
                Ok(previous) => previous_values.push((update.name.clone(), previous)),
                Err(err) => {
                    error!(
                        target: "twc.tagupdate",
                        tag = %update.name,
                        error = %err,
                        "unable to capture the previous tag value before applying an update"
                    );
                    apply_failed = true;
                    break;
                }
            }
        }
        match tags.write_value(&update.name, &update.value).await {
            Ok(()) => {
                info!(
                    target: "twc.tagupdate",
                    tag = %update.name,
                    value = %update.value.display_string(),
                    "tag_value_applied"
                );
            }
            Err(err) => {
                error!(
                    target: "twc.tagupdate",
                    tag = %update.name,
                    value = %update.value.display_string(),
                    error = %err,
                    "the tag value could not be updated as specified in the tag update response"
                );
                apply_failed = true;
                break;
            }
        }
    }
    if !apply_failed {
        return ApplyOutcome::Success;
    }

    if restore_on_fault && !previous_values.is_empty() {
        warn!(
            target: "twc.tagupdate",
            tags = previous_values.len(),
            "tag values are being restored after a failed apply"
        );
        record_tag_update_rollback();
        let mut partial_restore = false;
        for (name, previous) in &previous_values {
            if let Err(err) = tags.write_value(name, previous).await {
                error!(
                    target: "twc.tagupdate",
                    tag = %name,
                    value = %previous.display_string(),
                    error = %err,
                    "an error occurred while restoring a previous tag value"
                );
                partial_restore = true;
            }
        }
        if partial_restore {
            error!(
                target: "twc.tagupdate",
                "tag values have only been partially restored, see previous logs for specific tags"
            );
        } else {
            info!(target: "twc.tagupdate", "tag values have been restored");
        }
    }
    ApplyOutcome::ApplyFail
}
