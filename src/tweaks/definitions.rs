// src/tweaks/definitions.rs

use super::{powershell::PowershellTweak, Tweak, TweakCategory, TweakId};

pub fn all_definitions() -> Vec<Tweak> {
    vec![
        storage_sense(),
        fast_startup(),
        ultimate_performance_plan(),
        windows_update_manual(),
        flush_dns_cache(),
        restart_audio_service(),
        reset_network_stack(),
        temp_files(),
        prefetch(),
        recycle_bin(),
        windows_update_cache(),
        thumbnail_cache(),
        browser_cache(),
        old_logs(),
    ]
}

pub fn storage_sense() -> Tweak {
    Tweak::powershell_tweak(
        "Storage Sense",
        "Lets Windows free up space automatically by removing files you do not need.",
        TweakCategory::System,
        PowershellTweak {
            id: TweakId::StorageSense,
            check_script: Some(
                r#"
$path = "HKCU:\Software\Microsoft\Windows\CurrentVersion\StorageSense\Parameters\StoragePolicy"
if (Test-Path $path) {
  $value = Get-ItemProperty -Path $path -Name "01" -ErrorAction SilentlyContinue
  if ($value."01" -eq 1) { Write-Output "enabled" } else { Write-Output "disabled" }
} else {
  Write-Output "disabled"
}
                "#,
            ),
            apply_script: r#"
$path = "HKCU:\Software\Microsoft\Windows\CurrentVersion\StorageSense\Parameters\StoragePolicy"
if (-not (Test-Path $path)) { New-Item -Path $path -Force | Out-Null }
Set-ItemProperty -Path $path -Name "01" -Value 1
            "#,
            restore_script: Some(
                r#"
$path = "HKCU:\Software\Microsoft\Windows\CurrentVersion\StorageSense\Parameters\StoragePolicy"
if (Test-Path $path) { Set-ItemProperty -Path $path -Name "01" -Value 0 }
                "#,
            ),
            target_state: Some("enabled"),
        },
        false,
    )
}

pub fn fast_startup() -> Tweak {
    Tweak::powershell_tweak(
        "Fast Startup",
        "Shortens boot time by hibernating the kernel session on shutdown.",
        TweakCategory::Power,
        PowershellTweak {
            id: TweakId::FastStartup,
            check_script: Some(
                r#"
$path = "HKLM:\SYSTEM\CurrentControlSet\Control\Session Manager\Power"
if (Test-Path $path) {
    $value = Get-ItemProperty -Path $path -Name "HiberbootEnabled" -ErrorAction SilentlyContinue
    if ($value.HiberbootEnabled -eq 1) { Write-Output "enabled" } else { Write-Output "disabled" }
} else {
    Write-Output "disabled"
}
                "#,
            ),
            apply_script: r#"
powercfg /hibernate on
$path = "HKLM:\SYSTEM\CurrentControlSet\Control\Session Manager\Power"
if (!(Test-Path $path)) { New-Item -Path $path -Force | Out-Null }
Set-ItemProperty -Path $path -Name "HiberbootEnabled" -Type DWord -Value 1
            "#,
            restore_script: Some(
                r#"
$path = "HKLM:\SYSTEM\CurrentControlSet\Control\Session Manager\Power"
if (Test-Path $path) { Set-ItemProperty -Path $path -Name "HiberbootEnabled" -Type DWord -Value 0 }
                "#,
            ),
            target_state: Some("enabled"),
        },
        true,
    )
}

pub fn ultimate_performance_plan() -> Tweak {
    Tweak::powershell_tweak(
        "Ultimate Performance Plan",
        "Activates the Ultimate Performance power plan, creating it first if it is missing. Restoring switches back to Balanced.",
        TweakCategory::Power,
        PowershellTweak {
            id: TweakId::UltimatePerformancePlan,
            check_script: Some(
                r#"
$current = powercfg /getactivescheme
if ($current -match "Ultimate Performance") { Write-Output "enabled" } else { Write-Output "disabled" }
                "#,
            ),
            apply_script: r#"
$ultimatePlan = powercfg -l | Select-String "Ultimate Performance"
if (-not $ultimatePlan) {
    powercfg -duplicatescheme e9a42b02-d5df-448d-aa00-03f14749eb61 | Out-Null
}
$ultimatePlanGUID = (powercfg -l | Select-String "Ultimate Performance" | Select-Object -First 1).ToString().Split()[3]
if (-not $ultimatePlanGUID) {
    Write-Error "Failed to find Ultimate Performance plan GUID."
    exit 1
}
powercfg -setactive $ultimatePlanGUID
Write-Output "Ultimate Performance power plan is now active."
            "#,
            restore_script: Some("powercfg /setactive 381b4222-f694-41f0-9685-ff5bb260df2e"),
            target_state: Some("enabled"),
        },
        false,
    )
}

pub fn windows_update_manual() -> Tweak {
    Tweak::powershell_tweak(
        "Manual Windows Update",
        "Switches the Windows Update service to manual start so updates only run when requested.",
        TweakCategory::Services,
        PowershellTweak {
            id: TweakId::WindowsUpdateManual,
            check_script: Some(
                r#"
$service = Get-Service -Name wuauserv -ErrorAction SilentlyContinue
if ($service.StartType -eq 'Manual') { Write-Output "enabled" } else { Write-Output "disabled" }
                "#,
            ),
            apply_script: r#"
Set-Service -Name wuauserv -StartupType Manual
Stop-Service -Name wuauserv -Force -ErrorAction SilentlyContinue
Write-Output "Windows Update set to Manual."
            "#,
            restore_script: Some(
                r#"
Set-Service -Name wuauserv -StartupType Automatic
Start-Service -Name wuauserv -ErrorAction SilentlyContinue
Write-Output "Windows Update set to Automatic."
                "#,
            ),
            target_state: Some("enabled"),
        },
        false,
    )
}

pub fn flush_dns_cache() -> Tweak {
    Tweak::action(
        TweakId::FlushDnsCache,
        "Flush DNS Cache",
        "Fixes name resolution problems by clearing the DNS resolver cache.",
        TweakCategory::Network,
        "ipconfig /flushdns\nWrite-Output \"DNS cache flushed.\"",
    )
}

pub fn restart_audio_service() -> Tweak {
    Tweak::action(
        TweakId::RestartAudioService,
        "Restart Audio Service",
        "Fixes sound problems by restarting the Windows audio service.",
        TweakCategory::Services,
        r#"
Stop-Service -Name "Audiosrv" -Force -ErrorAction SilentlyContinue
Start-Service -Name "Audiosrv" -ErrorAction SilentlyContinue
Write-Output "Audio service restarted."
        "#,
    )
}

pub fn reset_network_stack() -> Tweak {
    let mut tweak = Tweak::action(
        TweakId::ResetNetworkStack,
        "Reset Network Stack",
        "Resets Winsock and the TCP/IP stack to fix connectivity problems.",
        TweakCategory::Network,
        r#"
netsh winsock reset
netsh int ip reset
Write-Output "Network stack reset. Restart your PC to apply changes."
        "#,
    );
    tweak.requires_reboot = true;
    tweak
}

pub fn temp_files() -> Tweak {
    Tweak::cleanup(
        TweakId::TempFiles,
        "Temporary Files",
        "Removes user and system temporary files.",
        r#"
$tempPaths = @("$env:TEMP", "C:\Windows\Temp")
$totalSize = 0
foreach ($path in $tempPaths) {
  if (Test-Path $path) {
    $files = Get-ChildItem -Path $path -Recurse -ErrorAction SilentlyContinue
    foreach ($file in $files) { $totalSize += $file.Length }
    Remove-Item -Path "$path\*" -Force -Recurse -ErrorAction SilentlyContinue
  }
}
Write-Output $totalSize
        "#,
        true,
    )
}

pub fn prefetch() -> Tweak {
    Tweak::cleanup(
        TweakId::Prefetch,
        "Prefetch Files",
        "Deletes the Windows boot and launch prefetch cache.",
        r#"
$path = "C:\Windows\Prefetch"
$totalSize = 0
if (Test-Path $path) {
  $files = Get-ChildItem -Path $path -Recurse -ErrorAction SilentlyContinue
  foreach ($file in $files) { $totalSize += $file.Length }
  Remove-Item -Path "$path\*" -Force -Recurse -ErrorAction SilentlyContinue
}
Write-Output $totalSize
        "#,
        true,
    )
}

pub fn recycle_bin() -> Tweak {
    Tweak::cleanup(
        TweakId::RecycleBin,
        "Recycle Bin",
        "Empties the recycle bin completely.",
        r#"
$shell = New-Object -ComObject Shell.Application
$recycleBin = $shell.NameSpace(0xa)
$totalSize = 0
foreach ($item in $recycleBin.Items()) { $totalSize += $item.Size }
Clear-RecycleBin -Force -ErrorAction SilentlyContinue
Write-Output $totalSize
        "#,
        false,
    )
}

pub fn windows_update_cache() -> Tweak {
    Tweak::cleanup(
        TweakId::WindowsUpdateCache,
        "Windows Update Cache",
        "Removes downloaded update packages.",
        r#"
$path = "C:\Windows\SoftwareDistribution\Download"
$totalSize = 0
if (Test-Path $path) {
  $files = Get-ChildItem -Path $path -Recurse -ErrorAction SilentlyContinue
  foreach ($file in $files) { $totalSize += $file.Length }
  Remove-Item -Path "$path\*" -Force -Recurse -ErrorAction SilentlyContinue
}
Write-Output $totalSize
        "#,
        true,
    )
}

pub fn thumbnail_cache() -> Tweak {
    Tweak::cleanup(
        TweakId::ThumbnailCache,
        "Thumbnail Cache",
        "Removes cached File Explorer thumbnails.",
        r#"
$path = "$env:LOCALAPPDATA\Microsoft\Windows\Explorer"
$totalSize = 0
if (Test-Path $path) {
  $files = Get-ChildItem -Path $path -Include "thumbcache_*.db" -Recurse -ErrorAction SilentlyContinue
  foreach ($file in $files) { $totalSize += $file.Length }
  Remove-Item -Path "$path\thumbcache_*.db" -Force -Recurse -ErrorAction SilentlyContinue
}
Write-Output $totalSize
        "#,
        true,
    )
}

pub fn browser_cache() -> Tweak {
    Tweak::cleanup(
        TweakId::BrowserCache,
        "Browser Cache",
        "Clears the Chrome and Edge caches.",
        r#"
$paths = @(
  "$env:LOCALAPPDATA\Google\Chrome\User Data\Default\Cache",
  "$env:LOCALAPPDATA\Microsoft\Edge\User Data\Default\Cache"
)
$totalSize = 0
foreach ($path in $paths) {
  if (Test-Path $path) {
    $files = Get-ChildItem -Path $path -Recurse -ErrorAction SilentlyContinue
    foreach ($file in $files) { $totalSize += $file.Length }
    Remove-Item -Path "$path\*" -Force -Recurse -ErrorAction SilentlyContinue
  }
}
Write-Output $totalSize
        "#,
        true,
    )
}

pub fn old_logs() -> Tweak {
    Tweak::cleanup(
        TweakId::OldLogs,
        "Old Log Files",
        "Removes system and application logs older than 30 days.",
        r#"
$paths = @("C:\Windows\Logs", "$env:LOCALAPPDATA\Temp")
$totalSize = 0
$cutoffDate = (Get-Date).AddDays(-30)
foreach ($path in $paths) {
  if (Test-Path $path) {
    $files = Get-ChildItem -Path $path -Include "*.log", "*.dmp" -Recurse -ErrorAction SilentlyContinue |
             Where-Object { $_.LastWriteTime -lt $cutoffDate }
    foreach ($file in $files) { $totalSize += $file.Length }
    $files | Remove-Item -Force -ErrorAction SilentlyContinue
  }
}
Write-Output $totalSize
        "#,
        true,
    )
}
